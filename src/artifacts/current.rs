//! Current prediction slot.
//!
//! A single JSON document, `{"predictie_model_20draws": [n1, ..., n6]}`,
//! overwritten on every successful retrain.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::artifacts::write_json_atomic;
use crate::error::{PipelineError, Result};
use crate::models::Prediction;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SlotDocument {
    #[serde(rename = "predictie_model_20draws")]
    prediction: Prediction,
}

pub struct PredictionSlot {
    path: PathBuf,
}

impl PredictionSlot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the slot.
    pub fn store(&self, prediction: &Prediction) -> Result<()> {
        write_json_atomic(
            &self.path,
            &SlotDocument {
                prediction: *prediction,
            },
            false,
        )?;
        debug!(path = %self.path.display(), %prediction, "Current prediction written");
        Ok(())
    }

    /// The stored prediction, or `None` if nothing was ever written.
    pub fn load(&self) -> Result<Option<Prediction>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&self.path)
            .map_err(|e| PipelineError::Artifact(format!("{}: {}", self.path.display(), e)))?;
        let doc: SlotDocument = serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Artifact(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(doc.prediction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let slot = PredictionSlot::new(dir.path().join("current.json"));
        assert_eq!(slot.load().unwrap(), None);

        slot.store(&Prediction::new([1, 2, 3, 4, 5, 6])).unwrap();
        slot.store(&Prediction::new([7, 8, 9, 10, 11, 12])).unwrap();

        assert_eq!(
            slot.load().unwrap(),
            Some(Prediction::new([7, 8, 9, 10, 11, 12]))
        );
    }

    #[test]
    fn test_document_shape() {
        let dir = tempfile::tempdir().unwrap();
        let slot = PredictionSlot::new(dir.path().join("current.json"));
        slot.store(&Prediction::new([4, 8, 15, 16, 23, 42])).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(slot.path()).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"predictie_model_20draws": [4, 8, 15, 16, 23, 42]})
        );
    }
}
