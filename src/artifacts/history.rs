//! Prediction History Log
//!
//! A JSON array of `{"data": "YYYY-MM-DD", "predictie": [...]}` entries in
//! computation order. The file is rewritten in full on each append, but
//! existing entries are never changed or removed: if the current log cannot
//! be read, the append fails instead of starting over.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::artifacts::write_json_atomic;
use crate::error::{PipelineError, Result};
use crate::models::{HistoryEntry, Prediction};

pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// All entries, oldest first. A missing file is an empty log.
    pub fn entries(&self) -> Result<Vec<HistoryEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&self.path)
            .map_err(|e| PipelineError::Artifact(format!("{}: {}", self.path.display(), e)))?;
        serde_json::from_slice(&bytes).map_err(|e| {
            PipelineError::Artifact(format!("corrupt history log {}: {}", self.path.display(), e))
        })
    }

    /// Append one entry and return the new log length.
    pub fn append(&self, computed_on: NaiveDate, prediction: &Prediction) -> Result<usize> {
        let mut entries = self.entries()?;
        entries.push(HistoryEntry {
            computed_on,
            prediction: *prediction,
        });
        write_json_atomic(&self.path, &entries, true)?;
        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "Prediction appended to history"
        );
        Ok(entries.len())
    }
}
