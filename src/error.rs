//! Pipeline error types.
//!
//! Only the first tier (normalize + merge) surfaces as `Err` from a pipeline
//! run. Prediction and history failures are carried as stage outcomes in the
//! run report, but the stages themselves still return these errors.

use crate::predict::ModelError;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors from the ingest-merge-retrain pipeline.
#[derive(Debug)]
pub enum PipelineError {
    /// The batch has the wrong column set or an uncoercible cell.
    MalformedBatch(String),
    /// The existing store could not be read.
    StoreReadFailure(String),
    /// The merged store could not be persisted. The old store is intact.
    StoreWriteFailure(String),
    /// Training or inference failed.
    Model(ModelError),
    /// Reading or writing a JSON artifact failed.
    Artifact(String),
    /// An input file could not be read.
    Io(String),
    Config(String),
}

impl PipelineError {
    /// True for errors that abort a run before anything is committed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedBatch(_) | Self::StoreReadFailure(_) | Self::StoreWriteFailure(_)
        )
    }
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedBatch(msg) => write!(f, "Malformed batch: {}", msg),
            Self::StoreReadFailure(msg) => write!(f, "Store read failure: {}", msg),
            Self::StoreWriteFailure(msg) => write!(f, "Store write failure: {}", msg),
            Self::Model(e) => write!(f, "Model error: {}", e),
            Self::Artifact(msg) => write!(f, "Artifact error: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        Self::Model(e)
    }
}

impl From<csv::Error> for PipelineError {
    fn from(e: csv::Error) -> Self {
        Self::MalformedBatch(format!("CSV: {}", e))
    }
}
