//! Lottery draw ingest-merge-retrain pipeline.
//!
//! Uploaded batches are normalized, merged into a deduplicated SQLite store,
//! and every merge that leaves enough history retrains a rolling-window
//! prediction and journals it. See [`pipeline`] for the failure tiers.

pub mod api;
pub mod artifacts;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod predict;
pub mod store;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use ingest::{BatchFormat, NormalizedBatch, RawBatch, RecordNormalizer};
pub use models::{DrawRecord, HistoryEntry, Prediction};
pub use pipeline::{HistoryStage, Pipeline, PipelineReport, PipelineStatus, PredictionStage};
pub use store::{HistoricalStore, MergeEngine, MergeOutcome, StoreStats};
