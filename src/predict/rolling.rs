//! Rolling Predictor
//!
//! Takes the `window_size` most recent draws (date descending, ties in store
//! order) and trains one classifier per position. Model `i` learns position
//! `i` from the other five positions of every window row, then predicts from
//! the other five values of the most recent row. The six models never share
//! state.

use std::sync::Arc;
use tracing::{debug, info};

use crate::models::{DrawRecord, Prediction, POSITIONS};
use crate::predict::{ClassifierFactory, ModelError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionOutcome {
    Predicted(Prediction),
    /// Not enough history. A normal outcome, not a failure.
    Declined { available: usize, required: usize },
}

pub struct RollingPredictor {
    window_size: usize,
    factory: Arc<dyn ClassifierFactory>,
}

impl RollingPredictor {
    pub fn new(window_size: usize, factory: Arc<dyn ClassifierFactory>) -> Self {
        Self {
            window_size: window_size.max(1),
            factory,
        }
    }

    /// Most recent rows first. The sort is stable, so equal dates keep the
    /// order they have in `records`.
    pub fn select_window<'a>(&self, records: &'a [DrawRecord]) -> Vec<&'a DrawRecord> {
        let mut sorted: Vec<&DrawRecord> = records.iter().collect();
        sorted.sort_by(|a, b| b.date.cmp(&a.date));
        sorted.truncate(self.window_size);
        sorted
    }

    pub fn predict(&self, records: &[DrawRecord]) -> Result<PredictionOutcome, ModelError> {
        if records.len() < self.window_size {
            debug!(
                available = records.len(),
                required = self.window_size,
                "Not enough draws to predict"
            );
            return Ok(PredictionOutcome::Declined {
                available: records.len(),
                required: self.window_size,
            });
        }

        let window = self.select_window(records);
        let latest = window[0];

        let mut numbers = [0i64; POSITIONS];
        for (position, slot) in numbers.iter_mut().enumerate() {
            let features: Vec<Vec<i64>> = window
                .iter()
                .map(|r| r.features_without(position))
                .collect();
            let labels: Vec<i64> = window.iter().map(|r| r.numbers[position]).collect();

            let mut model = self.factory.build();
            model.fit(&features, &labels)?;
            *slot = model.predict(&latest.features_without(position))?;
        }

        let prediction = Prediction::new(numbers);
        info!(
            window = window.len(),
            latest = %latest.date,
            prediction = %prediction,
            "Rolling prediction computed"
        );
        Ok(PredictionOutcome::Predicted(prediction))
    }
}
