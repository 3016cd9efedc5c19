//! Ingest-merge-retrain pipeline
//!
//! One run processes one uploaded batch through three independently
//! failable tiers:
//!
//! 1. **Normalize + merge**: any failure aborts the run with `Err` and the
//!    store is left untouched.
//! 2. **Retrain**: predict from the merged rows and overwrite the current
//!    slot. A failure becomes [`PredictionStage::Failed`]; the merge stands.
//! 3. **Journal**: append the new prediction to the history log. Only runs
//!    after tier 2 produced [`PredictionStage::Updated`]. A failure becomes
//!    [`HistoryStage::Failed`]; merge and prediction stand.
//!
//! Runs inside one process are serialized by a run guard. The store is
//! replaced in full on every merge, so writers in other processes must be
//! excluded externally.

use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::artifacts::{HistoryLog, PredictionSlot};
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::{RawBatch, RecordNormalizer};
use crate::models::{DrawRecord, HistoryEntry, Prediction};
use crate::predict::{
    ClassifierFactory, ForestFactory, ForestParams, PredictionOutcome, RollingPredictor,
};
use crate::store::{HistoricalStore, MergeEngine, MergeOutcome, StoreStats};

/// Tier 2 result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionStage {
    /// New prediction computed and written to the current slot.
    Updated { prediction: Prediction },
    /// Fewer rows than the window needs. The slot was not touched.
    Declined { available: usize, required: usize },
    Failed { error: String },
}

/// Tier 3 result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HistoryStage {
    Appended { entries: usize },
    /// No new prediction to journal.
    Skipped,
    Failed { error: String },
}

/// Everything a caller needs to report a committed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub merge: MergeOutcome,
    /// Batch rows dropped for an unparseable date.
    pub dropped_rows: usize,
    pub prediction: PredictionStage,
    pub history: HistoryStage,
}

impl PipelineReport {
    /// True when the merge committed but a later tier failed.
    pub fn is_partial(&self) -> bool {
        matches!(self.prediction, PredictionStage::Failed { .. })
            || matches!(self.history, HistoryStage::Failed { .. })
    }

    pub fn new_prediction(&self) -> Option<&Prediction> {
        match &self.prediction {
            PredictionStage::Updated { prediction } => Some(prediction),
            _ => None,
        }
    }

    /// Human-readable outcome lines, in tier order.
    pub fn messages(&self) -> Vec<String> {
        let mut out = vec![format!(
            "{} draws processed ({} new). Store total: {}.",
            self.merge.incoming, self.merge.inserted, self.merge.total
        )];
        if self.dropped_rows > 0 {
            out.push(format!(
                "{} rows skipped because their date could not be parsed.",
                self.dropped_rows
            ));
        }

        out.push(match &self.prediction {
            PredictionStage::Updated { prediction } => {
                format!("Prediction recalculated: {}", prediction)
            }
            PredictionStage::Declined {
                available,
                required,
            } => format!(
                "Not enough data to recalculate the prediction (need at least {} draws, have {}).",
                required, available
            ),
            PredictionStage::Failed { error } => {
                format!("Warning: could not recalculate the prediction: {}", error)
            }
        });

        match &self.history {
            HistoryStage::Appended { entries } => out.push(format!(
                "Prediction saved to history ({} entries).",
                entries
            )),
            HistoryStage::Failed { error } => out.push(format!(
                "Warning: could not save the prediction to history: {}",
                error
            )),
            HistoryStage::Skipped => {}
        }
        out
    }
}

/// Read-only snapshot of the pipeline's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub store: StoreStats,
    pub current_prediction: Option<Prediction>,
    /// `None` when the history log exists but cannot be read.
    pub history_entries: Option<usize>,
}

pub struct Pipeline {
    normalizer: RecordNormalizer,
    store: HistoricalStore,
    predictor: RollingPredictor,
    slot: PredictionSlot,
    history: HistoryLog,
    run_guard: Mutex<()>,
}

impl Pipeline {
    /// Pipeline with the seeded random forest from `config.model`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let factory = ForestFactory::new(ForestParams::from(&config.model));
        Self::with_classifier(config, Arc::new(factory))
    }

    pub fn with_classifier(
        config: &PipelineConfig,
        factory: Arc<dyn ClassifierFactory>,
    ) -> Result<Self> {
        let storage = &config.storage;
        Ok(Self {
            normalizer: RecordNormalizer::new(&config.ingest),
            store: HistoricalStore::new(storage.database_path(), &storage.table)?,
            predictor: RollingPredictor::new(config.model.window_size, factory),
            slot: PredictionSlot::new(storage.prediction_path()),
            history: HistoryLog::new(storage.history_path()),
            run_guard: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &HistoricalStore {
        &self.store
    }

    pub fn slot(&self) -> &PredictionSlot {
        &self.slot
    }

    /// Run with today's local date as the computation date.
    pub fn run(&self, batch: &RawBatch) -> Result<PipelineReport> {
        self.run_on(batch, Local::now().date_naive())
    }

    /// Run one batch. `Err` only for tier 1 failures.
    pub fn run_on(&self, batch: &RawBatch, today: NaiveDate) -> Result<PipelineReport> {
        let _guard = self.run_guard.lock();

        let normalized = self.normalizer.normalize(batch)?;
        let (merge, merged) = MergeEngine::new(&self.store).merge(&normalized)?;

        let prediction = self.retrain(&merged);
        let history = match &prediction {
            PredictionStage::Updated { prediction } => self.journal(today, prediction),
            _ => HistoryStage::Skipped,
        };

        let report = PipelineReport {
            merge,
            dropped_rows: normalized.dropped_rows,
            prediction,
            history,
        };
        info!(
            total = report.merge.total,
            partial = report.is_partial(),
            "Pipeline run finished"
        );
        Ok(report)
    }

    fn retrain(&self, merged: &[DrawRecord]) -> PredictionStage {
        let result = self
            .predictor
            .predict(merged)
            .map_err(PipelineError::from)
            .and_then(|outcome| match outcome {
                PredictionOutcome::Predicted(prediction) => {
                    self.slot.store(&prediction)?;
                    Ok(PredictionStage::Updated { prediction })
                }
                PredictionOutcome::Declined {
                    available,
                    required,
                } => Ok(PredictionStage::Declined {
                    available,
                    required,
                }),
            });

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Prediction stage failed, merge kept");
            PredictionStage::Failed {
                error: e.to_string(),
            }
        })
    }

    fn journal(&self, today: NaiveDate, prediction: &Prediction) -> HistoryStage {
        match self.history.append(today, prediction) {
            Ok(entries) => HistoryStage::Appended { entries },
            Err(e) => {
                warn!(error = %e, "History stage failed, prediction kept");
                HistoryStage::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn status(&self) -> Result<PipelineStatus> {
        Ok(PipelineStatus {
            store: self.store.stats()?,
            current_prediction: self.slot.load()?,
            history_entries: match self.history.entries() {
                Ok(entries) => Some(entries.len()),
                Err(e) => {
                    warn!(error = %e, "History log unreadable, reporting status without it");
                    None
                }
            },
        })
    }

    pub fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.history.entries()
    }
}
