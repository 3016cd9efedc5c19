//! Batch intake: raw upload parsing and normalization.

pub mod batch;
pub mod normalize;

pub use batch::{BatchFormat, RawBatch};
pub use normalize::{NormalizedBatch, RecordNormalizer};
