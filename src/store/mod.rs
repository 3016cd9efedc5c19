//! Historical Store
//!
//! SQLite table holding every known draw, deduplicated on the full
//! (date, numbers) key.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE loto_draws (
//!     Date TEXT NOT NULL,      -- ISO yyyy-mm-dd
//!     Pos1 INTEGER NOT NULL,
//!     ...
//!     Pos6 INTEGER NOT NULL,
//!     UNIQUE (Date, Pos1, Pos2, Pos3, Pos4, Pos5, Pos6)
//! );
//! ```
//!
//! Writes always replace the whole table through a staging table inside one
//! transaction, so readers see either the old or the new store. A connection
//! is opened per operation and closed before returning.

pub mod merge;

pub use merge::{dedup_preserving_order, MergeEngine, MergeOutcome};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::models::{DrawRecord, POSITIONS, POSITION_COLUMNS};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Summary of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_draws: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

pub struct HistoricalStore {
    db_path: PathBuf,
    table: String,
}

impl HistoricalStore {
    pub fn new(db_path: impl AsRef<Path>, table: &str) -> Result<Self> {
        if !is_identifier(table) {
            return Err(PipelineError::Config(format!(
                "invalid store table name {:?}",
                table
            )));
        }
        Ok(Self {
            db_path: db_path.as_ref().to_path_buf(),
            table: table.to_string(),
        })
    }

    fn open(&self) -> std::result::Result<Connection, rusqlite::Error> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();
        Ok(conn)
    }

    fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(true),
            )
            .optional()?;
        Ok(found.unwrap_or(false))
    }

    /// All rows in store order. A store that was never written is empty.
    pub fn load(&self) -> Result<Vec<DrawRecord>> {
        if !self.db_path.exists() {
            return Ok(Vec::new());
        }

        let read_err = |e: rusqlite::Error| PipelineError::StoreReadFailure(e.to_string());
        let conn = self.open().map_err(read_err)?;
        if !Self::table_exists(&conn, &self.table).map_err(read_err)? {
            debug!(table = %self.table, "Store table absent, treating as empty");
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT Date, {} FROM {} ORDER BY rowid ASC",
            POSITION_COLUMNS.join(", "),
            self.table
        );
        let mut stmt = conn.prepare(&sql).map_err(read_err)?;
        let rows = stmt
            .query_map([], |row| {
                let date: String = row.get(0)?;
                let mut numbers = [0i64; POSITIONS];
                for (i, n) in numbers.iter_mut().enumerate() {
                    *n = row.get(i + 1)?;
                }
                Ok((date, numbers))
            })
            .map_err(read_err)?;

        let mut out = Vec::new();
        for row in rows {
            let (date, numbers) = row.map_err(read_err)?;
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|e| {
                PipelineError::StoreReadFailure(format!("stored date {:?}: {}", date, e))
            })?;
            out.push(DrawRecord::new(date, numbers));
        }
        Ok(out)
    }

    /// Replace the entire table with `records`, atomically.
    ///
    /// Rows are written in slice order so that store order survives. On any
    /// failure the transaction rolls back and the previous table is intact.
    pub fn replace_all(&self, records: &[DrawRecord]) -> Result<()> {
        let write_err = |e: rusqlite::Error| PipelineError::StoreWriteFailure(e.to_string());

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PipelineError::StoreWriteFailure(e.to_string()))?;
            }
        }

        let mut conn = self.open().map_err(write_err)?;
        let staging = format!("{}_staging", self.table);
        let columns: Vec<String> = POSITION_COLUMNS
            .iter()
            .map(|c| format!("{} INTEGER NOT NULL", c))
            .collect();

        let tx = conn.transaction().map_err(write_err)?;
        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {staging};
             CREATE TABLE {staging} (
                Date TEXT NOT NULL,
                {cols},
                UNIQUE (Date, {keys})
             );",
            staging = staging,
            cols = columns.join(",\n                "),
            keys = POSITION_COLUMNS.join(", "),
        ))
        .map_err(write_err)?;

        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} (Date, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    staging,
                    POSITION_COLUMNS.join(", ")
                ))
                .map_err(write_err)?;
            for rec in records {
                let n = &rec.numbers;
                stmt.execute(params![
                    rec.date.format(DATE_FORMAT).to_string(),
                    n[0],
                    n[1],
                    n[2],
                    n[3],
                    n[4],
                    n[5],
                ])
                .map_err(write_err)?;
            }
        }

        tx.execute_batch(&format!(
            "DROP TABLE IF EXISTS {table};
             ALTER TABLE {staging} RENAME TO {table};",
            table = self.table,
            staging = staging,
        ))
        .map_err(write_err)?;
        tx.commit().map_err(write_err)?;

        info!(
            table = %self.table,
            rows = records.len(),
            "Store replaced"
        );
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.stats()?.total_draws)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        if !self.db_path.exists() {
            return Ok(StoreStats::default());
        }
        let read_err = |e: rusqlite::Error| PipelineError::StoreReadFailure(e.to_string());
        let conn = self.open().map_err(read_err)?;
        if !Self::table_exists(&conn, &self.table).map_err(read_err)? {
            return Ok(StoreStats::default());
        }

        let (total, first, last): (i64, Option<String>, Option<String>) = conn
            .query_row(
                &format!("SELECT COUNT(*), MIN(Date), MAX(Date) FROM {}", self.table),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(read_err)?;

        let parse = |s: Option<String>| {
            s.and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok())
        };
        Ok(StoreStats {
            total_draws: total as usize,
            first_date: parse(first),
            last_date: parse(last),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
