//! Merge Engine
//!
//! Concatenates the stored rows with a normalized batch, drops duplicates on
//! the full (date, numbers) key keeping the first occurrence, and replaces the
//! store with the result. Existing rows come first, so they win over
//! identical incoming rows. Re-merging the same batch leaves the key set
//! unchanged.

use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::error::Result;
use crate::ingest::NormalizedBatch;
use crate::models::DrawRecord;
use crate::store::HistoricalStore;

/// Counts reported after a committed merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    /// Rows in the normalized batch.
    pub incoming: usize,
    /// Rows the store gained.
    pub inserted: usize,
    /// Rows in the merged store.
    pub total: usize,
}

/// Keep the first occurrence of every record, in input order.
pub fn dedup_preserving_order<I>(records: I) -> Vec<DrawRecord>
where
    I: IntoIterator<Item = DrawRecord>,
{
    let mut seen = HashSet::new();
    records.into_iter().filter(|r| seen.insert(*r)).collect()
}

pub struct MergeEngine<'a> {
    store: &'a HistoricalStore,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a HistoricalStore) -> Self {
        Self { store }
    }

    /// Merge and persist. Returns the outcome and the merged rows in store
    /// order, so the caller does not need to read the store back.
    pub fn merge(&self, batch: &NormalizedBatch) -> Result<(MergeOutcome, Vec<DrawRecord>)> {
        let existing = self.store.load()?;
        let before = existing.len();

        let merged = dedup_preserving_order(
            existing
                .into_iter()
                .chain(batch.records.iter().copied()),
        );
        self.store.replace_all(&merged)?;

        let outcome = MergeOutcome {
            incoming: batch.len(),
            inserted: merged.len().saturating_sub(before),
            total: merged.len(),
        };
        info!(
            incoming = outcome.incoming,
            inserted = outcome.inserted,
            total = outcome.total,
            "Batch merged into store"
        );
        Ok((outcome, merged))
    }
}
