use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::PipelineError;
use crate::ingest::{BatchFormat, RawBatch};
use crate::pipeline::{Pipeline, PipelineReport};

/// Shared state for the HTTP routes.
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/batches", post(post_batch))
        .route("/api/status", get(get_status))
        .route("/api/prediction", get(get_prediction))
        .route("/api/history", get(get_history))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    report: PipelineReport,
    messages: Vec<String>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({ "error": message });
    (status, Json(body)).into_response()
}

fn status_for(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::MalformedBatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Run `f` against the pipeline on the blocking pool.
async fn with_pipeline<T, F>(state: &ApiState, f: F) -> Result<T, Response>
where
    F: FnOnce(&Pipeline) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let pipeline = state.pipeline.clone();
    match tokio::task::spawn_blocking(move || f(&pipeline)).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!("Pipeline request failed: {}", e);
            Err(error_response(status_for(&e), &e.to_string()))
        }
        Err(e) => {
            warn!("Pipeline task panicked: {}", e);
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "pipeline task failed",
            ))
        }
    }
}

async fn health_check() -> &'static str {
    "ok"
}

/// POST /api/batches - Ingest one batch
async fn post_batch(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let format = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(BatchFormat::from_content_type)
        .unwrap_or(BatchFormat::Csv);

    let result = with_pipeline(&state, move |pipeline| {
        let batch = RawBatch::from_bytes(&body, format)?;
        pipeline.run(&batch)
    })
    .await;

    match result {
        Ok(report) => {
            let messages = report.messages();
            Json(BatchResponse { report, messages }).into_response()
        }
        Err(response) => response,
    }
}

/// GET /api/status
async fn get_status(State(state): State<Arc<ApiState>>) -> Response {
    match with_pipeline(&state, |p| p.status()).await {
        Ok(status) => Json(status).into_response(),
        Err(response) => response,
    }
}

/// GET /api/prediction
async fn get_prediction(State(state): State<Arc<ApiState>>) -> Response {
    match with_pipeline(&state, |p| p.slot().load()).await {
        Ok(Some(prediction)) => Json(serde_json::json!({
            "predictie_model_20draws": prediction,
        }))
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "no prediction computed yet"),
        Err(response) => response,
    }
}

/// GET /api/history
async fn get_history(State(state): State<Arc<ApiState>>) -> Response {
    match with_pipeline(&state, |p| p.history()).await {
        Ok(entries) => Json(entries).into_response(),
        Err(response) => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn csv_batch(n: usize) -> String {
        let mut out = String::from("Date,Pos1,Pos2,Pos3,Pos4,Pos5,Pos6\n");
        for i in 0..n {
            out.push_str(&format!(
                "2024-{:02}-{:02},{},{},{},{},{},{}\n",
                i / 28 + 1,
                i % 28 + 1,
                i % 49 + 1,
                (i * 2) % 49 + 1,
                (i * 3) % 49 + 1,
                (i * 5) % 49 + 1,
                (i * 7) % 49 + 1,
                (i * 11) % 49 + 1
            ));
        }
        out
    }

    fn test_app(dir: &tempfile::TempDir) -> Router {
        let mut config = PipelineConfig::default().with_data_dir(dir.path());
        config.model.n_estimators = 5;
        let pipeline = Arc::new(Pipeline::from_config(&config).unwrap());
        router(Arc::new(ApiState { pipeline }))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_post_batch_then_read_prediction() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let missing = app
            .clone()
            .oneshot(Request::get("/api/prediction").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(
                Request::post("/api/batches")
                    .header(header::CONTENT_TYPE, "text/csv")
                    .body(Body::from(csv_batch(20)))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["report"]["merge"]["total"], 20);
        assert_eq!(json["report"]["prediction"]["status"], "updated");

        let prediction = app
            .clone()
            .oneshot(Request::get("/api/prediction").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(prediction.status(), StatusCode::OK);
        let json = body_json(prediction).await;
        assert_eq!(json["predictie_model_20draws"].as_array().unwrap().len(), 6);

        let history = app
            .oneshot(Request::get("/api/history").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(history).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_excel_workbook() {
        use rust_xlsxwriter::Workbook;

        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, name) in ["Data", "Nr.1", "Nr.2", "Nr.3", "Nr.4", "Nr.5", "Nr.6"]
            .iter()
            .enumerate()
        {
            sheet.write_string(0, col as u16, *name).unwrap();
        }
        for row in 1..=3u32 {
            sheet
                .write_string(row, 0, format!("2024-02-{:02}", row))
                .unwrap();
            for col in 1..=6u16 {
                sheet
                    .write_number(row, col, (row * 6 + col as u32) as f64)
                    .unwrap();
            }
        }
        let bytes = workbook.save_to_buffer().unwrap();

        let response = app
            .oneshot(
                Request::post("/api/batches")
                    .header(
                        header::CONTENT_TYPE,
                        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                    )
                    .body(Body::from(bytes))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["report"]["merge"]["total"], 3);
        assert_eq!(json["report"]["prediction"]["status"], "declined");
    }

    #[tokio::test]
    async fn test_status_survives_corrupt_history() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);
        let history = PipelineConfig::default()
            .with_data_dir(dir.path())
            .storage
            .history_path();
        std::fs::write(&history, "").unwrap();

        let response = app
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(json["history_entries"].is_null());
        assert_eq!(json["store"]["total_draws"], 0);
    }

    #[tokio::test]
    async fn test_malformed_batch_is_422() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(&dir);

        let response = app
            .oneshot(
                Request::post("/api/batches")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"[{"Date": "2024-01-01", "Pos1": 3}]"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("missing column"));
    }
}
