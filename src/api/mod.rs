//! HTTP surface for the pipeline.
//!
//! # Endpoints
//!
//! - `GET /health`
//! - `POST /api/batches` - Upload a CSV (default) or JSON (`Content-Type:
//!   application/json`) batch and run the pipeline
//! - `GET /api/status` - Store stats, current prediction, history length
//! - `GET /api/prediction` - Current prediction slot (404 before the first)
//! - `GET /api/history` - Prediction history log
//!
//! Pipeline calls are blocking (SQLite + model fit) and run on the blocking
//! thread pool.

pub mod batches;

pub use batches::{router, ApiState};
