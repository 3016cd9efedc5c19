//! Rolling-window prediction.
//!
//! The pipeline sees the classifier only through [`Classifier`] and
//! [`ClassifierFactory`]. The bundled implementation is a seeded random
//! forest of CART trees ([`forest::RandomForestClassifier`]).
//!
//! # Determinism
//!
//! - Every model draws from a `ChaCha8Rng` seeded from the configured seed
//! - The six per-position models are seeded identically
//! - Label ties resolve to the smallest label

pub mod forest;
pub mod rolling;
pub mod tree;

pub use forest::{ForestFactory, ForestParams, RandomForestClassifier};
pub use rolling::{PredictionOutcome, RollingPredictor};

/// A single-output classifier over integer features and labels.
pub trait Classifier {
    fn fit(&mut self, features: &[Vec<i64>], labels: &[i64]) -> Result<(), ModelError>;

    fn predict(&self, features: &[i64]) -> Result<i64, ModelError>;
}

/// Builds a fresh, untrained classifier for each draw position.
pub trait ClassifierFactory: Send + Sync {
    fn build(&self) -> Box<dyn Classifier>;
}

/// Errors from training or inference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    EmptyTrainingSet,
    ShapeMismatch { expected: usize, got: usize },
    NotFitted,
    Other(String),
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTrainingSet => write!(f, "training set is empty"),
            Self::ShapeMismatch { expected, got } => {
                write!(f, "expected {} features, got {}", expected, got)
            }
            Self::NotFitted => write!(f, "model used before fit"),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ModelError {}
