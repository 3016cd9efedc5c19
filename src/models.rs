//! Core data types shared by every pipeline stage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of drawn positions per record.
pub const POSITIONS: usize = 6;

/// Canonical column names of an incoming batch and of the store table.
pub const DATE_COLUMN: &str = "Date";
pub const POSITION_COLUMNS: [&str; POSITIONS] = ["Pos1", "Pos2", "Pos3", "Pos4", "Pos5", "Pos6"];

/// Legacy export headers accepted as aliases of the canonical ones.
pub const LEGACY_DATE_COLUMN: &str = "Data";
pub const LEGACY_POSITION_COLUMNS: [&str; POSITIONS] =
    ["Nr.1", "Nr.2", "Nr.3", "Nr.4", "Nr.5", "Nr.6"];

/// Rows in the rolling training window.
pub const WINDOW_SIZE: usize = 20;

/// Inclusive domain of a drawn number.
pub const NUMBER_MIN: i64 = 1;
pub const NUMBER_MAX: i64 = 49;

/// One lottery drawing.
///
/// Equality and hashing cover exactly the dedup key: the date plus all six
/// numbers in position order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DrawRecord {
    pub date: NaiveDate,
    pub numbers: [i64; POSITIONS],
}

impl DrawRecord {
    pub fn new(date: NaiveDate, numbers: [i64; POSITIONS]) -> Self {
        Self { date, numbers }
    }

    /// The five numbers other than `position`, in position order.
    pub fn features_without(&self, position: usize) -> Vec<i64> {
        self.numbers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != position)
            .map(|(_, n)| *n)
            .collect()
    }
}

impl fmt::Display for DrawRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.date, self.numbers)
    }
}

/// One predicted value per draw position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Prediction {
    pub numbers: [i64; POSITIONS],
}

impl Prediction {
    pub fn new(numbers: [i64; POSITIONS]) -> Self {
        Self { numbers }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.numbers)
    }
}

/// One journal line of the prediction history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Day the prediction was computed.
    #[serde(rename = "data")]
    pub computed_on: NaiveDate,
    #[serde(rename = "predictie")]
    pub prediction: Prediction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_features_without_skips_position() {
        let rec = DrawRecord::new(date(2024, 1, 4), [1, 2, 3, 4, 5, 6]);
        assert_eq!(rec.features_without(0), vec![2, 3, 4, 5, 6]);
        assert_eq!(rec.features_without(3), vec![1, 2, 3, 5, 6]);
        assert_eq!(rec.features_without(5), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_history_entry_wire_format() {
        let entry = HistoryEntry {
            computed_on: date(2024, 3, 1),
            prediction: Prediction::new([3, 9, 14, 22, 31, 47]),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"data": "2024-03-01", "predictie": [3, 9, 14, 22, 31, 47]})
        );
    }

    #[test]
    fn test_records_differing_in_one_number_are_distinct() {
        let a = DrawRecord::new(date(2024, 1, 4), [1, 2, 3, 4, 5, 6]);
        let b = DrawRecord::new(date(2024, 1, 4), [1, 2, 3, 4, 5, 7]);
        assert_ne!(a, b);
        assert_eq!(a, DrawRecord::new(date(2024, 1, 4), [1, 2, 3, 4, 5, 6]));
    }
}
