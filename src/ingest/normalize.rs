//! Record Normalizer
//!
//! Turns a raw uploaded batch into canonical draw records:
//! - the column set must be exactly `Date` + `Pos1..Pos6` (or the legacy
//!   `Data` + `Nr.1..Nr.6` headers)
//! - rows whose date does not parse are dropped silently
//! - every number cell of a retained row must be an integer, otherwise the
//!   whole batch is rejected

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::batch::RawBatch;
use crate::models::{
    DrawRecord, DATE_COLUMN, LEGACY_DATE_COLUMN, LEGACY_POSITION_COLUMNS, POSITIONS,
    POSITION_COLUMNS,
};

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Output of a successful normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub records: Vec<DrawRecord>,
    /// Rows removed because their date did not parse.
    pub dropped_rows: usize,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Column positions of the date and the six numbers inside a raw row.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    positions: [usize; POSITIONS],
}

#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    date_formats: Vec<String>,
    domain: Option<(i64, i64)>,
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(&IngestConfig::default())
    }
}

impl RecordNormalizer {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            date_formats: config.date_formats.clone(),
            domain: config
                .enforce_number_domain
                .then_some((config.number_min, config.number_max)),
        }
    }

    pub fn normalize(&self, batch: &RawBatch) -> Result<NormalizedBatch> {
        let columns = map_columns(&batch.headers)?;

        let mut out = NormalizedBatch {
            records: Vec::with_capacity(batch.rows.len()),
            dropped_rows: 0,
        };

        for (idx, row) in batch.rows.iter().enumerate() {
            let raw_date = row.get(columns.date).map(String::as_str).unwrap_or("");
            let Some(date) = self.parse_date(raw_date) else {
                debug!(row = idx + 1, value = raw_date, "Dropping row with unparseable date");
                out.dropped_rows += 1;
                continue;
            };

            let mut numbers = [0i64; POSITIONS];
            for (pos, &col) in columns.positions.iter().enumerate() {
                let cell = row.get(col).map(String::as_str).unwrap_or("");
                let n = coerce_integer(cell).ok_or_else(|| {
                    PipelineError::MalformedBatch(format!(
                        "row {}: {} value {:?} is not an integer",
                        idx + 1,
                        POSITION_COLUMNS[pos],
                        cell
                    ))
                })?;
                if let Some((min, max)) = self.domain {
                    if n < min || n > max {
                        return Err(PipelineError::MalformedBatch(format!(
                            "row {}: {} value {} outside [{}, {}]",
                            idx + 1,
                            POSITION_COLUMNS[pos],
                            n,
                            min,
                            max
                        )));
                    }
                }
                numbers[pos] = n;
            }

            out.records.push(DrawRecord::new(date, numbers));
        }

        Ok(out)
    }

    /// Parse with the configured date formats, then as a date-time keeping
    /// only the calendar date.
    pub fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        for fmt in &self.date_formats {
            if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
                return Some(d);
            }
        }
        for fmt in DATETIME_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
                return Some(dt.date());
            }
        }
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.date_naive())
    }
}

fn map_columns(headers: &[String]) -> Result<ColumnMap> {
    let mut date: Option<usize> = None;
    let mut positions: [Option<usize>; POSITIONS] = [None; POSITIONS];

    for (idx, header) in headers.iter().enumerate() {
        let name = header.trim();
        let slot = if is_column(name, DATE_COLUMN, LEGACY_DATE_COLUMN) {
            &mut date
        } else if let Some(pos) = (0..POSITIONS)
            .find(|&p| is_column(name, POSITION_COLUMNS[p], LEGACY_POSITION_COLUMNS[p]))
        {
            &mut positions[pos]
        } else {
            return Err(PipelineError::MalformedBatch(format!(
                "unexpected column {:?}",
                name
            )));
        };

        if slot.replace(idx).is_some() {
            return Err(PipelineError::MalformedBatch(format!(
                "duplicate column {:?}",
                name
            )));
        }
    }

    let date = date.ok_or_else(|| {
        PipelineError::MalformedBatch(format!("missing column {:?}", DATE_COLUMN))
    })?;

    let mut resolved = [0usize; POSITIONS];
    for (pos, col) in positions.iter().enumerate() {
        resolved[pos] = col.ok_or_else(|| {
            PipelineError::MalformedBatch(format!("missing column {:?}", POSITION_COLUMNS[pos]))
        })?;
    }

    Ok(ColumnMap {
        date,
        positions: resolved,
    })
}

fn is_column(name: &str, canonical: &str, legacy: &str) -> bool {
    name.eq_ignore_ascii_case(canonical) || name.eq_ignore_ascii_case(legacy)
}

/// Integer text, or float text with no fractional part.
fn coerce_integer(cell: &str) -> Option<i64> {
    let cell = cell.trim();
    if let Ok(n) = cell.parse::<i64>() {
        return Some(n);
    }
    let f = cell.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
