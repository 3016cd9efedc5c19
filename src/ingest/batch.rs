//! Raw tabular batches as uploaded, before any validation.

use calamine::{open_workbook_auto_from_rs, Data, DataType, Reader};
use serde_json::Value;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{PipelineError, Result};

/// Upload encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchFormat {
    Csv,
    Json,
    /// Excel workbook (`.xlsx`, `.xls`); only the first sheet is read.
    Xlsx,
}

impl BatchFormat {
    /// Infer from a file extension. Unknown extensions are read as CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Self::Json,
            Some("xlsx") | Some("xls") | Some("xlsm") => Self::Xlsx,
            _ => Self::Csv,
        }
    }

    /// Infer from an HTTP `Content-Type`. Anything unrecognized is CSV.
    pub fn from_content_type(content_type: &str) -> Self {
        let ct = content_type.to_ascii_lowercase();
        if ct.contains("spreadsheetml") || ct.contains("ms-excel") {
            Self::Xlsx
        } else if ct.contains("json") {
            Self::Json
        } else {
            Self::Csv
        }
    }
}

impl std::str::FromStr for BatchFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" | "xls" | "excel" => Ok(Self::Xlsx),
            other => Err(format!("unknown batch format: {}", other)),
        }
    }
}

/// A header row plus string cells. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBatch {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawBatch {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn from_bytes(bytes: &[u8], format: BatchFormat) -> Result<Self> {
        match format {
            BatchFormat::Csv => Self::from_csv_reader(bytes),
            BatchFormat::Json => Self::from_json_slice(bytes),
            BatchFormat::Xlsx => Self::from_xlsx_slice(bytes),
        }
    }

    /// Read and decode a batch file. A file that cannot be read is
    /// [`PipelineError::Io`], not a malformed batch.
    pub fn from_path(path: &Path, format: BatchFormat) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| PipelineError::Io(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes, format)
    }

    /// Read CSV with a header row. Short rows are padded with empty cells.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for (idx, record) in rdr.records().enumerate() {
            let record = record?;
            if record.len() > width {
                return Err(PipelineError::MalformedBatch(format!(
                    "row {} has {} cells, header has {}",
                    idx + 1,
                    record.len(),
                    width
                )));
            }
            let mut row: Vec<String> = record.iter().map(|c| c.to_string()).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Read a JSON array of flat objects. Headers are the union of keys in
    /// first-seen order; absent keys and `null` become empty cells.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::MalformedBatch(format!("JSON: {}", e)))?;
        let items = value.as_array().ok_or_else(|| {
            PipelineError::MalformedBatch("JSON batch must be an array of objects".to_string())
        })?;

        let mut headers: Vec<String> = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            let obj = item.as_object().ok_or_else(|| {
                PipelineError::MalformedBatch(format!("JSON row {} is not an object", idx + 1))
            })?;
            for key in obj.keys() {
                if !headers.iter().any(|h| h == key) {
                    headers.push(key.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(items.len());
        for item in items {
            // Checked above
            let Some(obj) = item.as_object() else { continue };
            let row = headers
                .iter()
                .map(|h| obj.get(h).map(cell_text).unwrap_or_default())
                .collect();
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Read the first sheet of an Excel workbook. The first row is the
    /// header; date cells become `YYYY-MM-DD` text.
    pub fn from_xlsx_slice(bytes: &[u8]) -> Result<Self> {
        let xlsx_err = |e: calamine::Error| PipelineError::MalformedBatch(format!("Excel: {}", e));

        let mut workbook =
            open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(xlsx_err)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| PipelineError::MalformedBatch("Excel workbook has no sheets".to_string()))?
            .map_err(xlsx_err)?;

        let mut sheet_rows = range.rows();
        let mut headers: Vec<String> = match sheet_rows.next() {
            Some(row) => row.iter().map(sheet_cell_text).collect(),
            None => return Ok(Self::default()),
        };
        // Formatted but empty cells widen the used range
        let width = headers
            .iter()
            .rposition(|h| !h.is_empty())
            .map_or(0, |i| i + 1);
        headers.truncate(width);

        let rows = sheet_rows
            .map(|row| {
                let mut cells: Vec<String> = row.iter().take(width).map(sheet_cell_text).collect();
                cells.resize(width, String::new());
                cells
            })
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .collect();

        Ok(Self { headers, rows })
    }
}

fn sheet_cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(n) => n.to_string(),
        // Whole numbers are stored as floats
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (*f as i64).to_string(),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        other => other.to_string(),
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_pads_short_rows() {
        let csv = "Date,Pos1,Pos2,Pos3,Pos4,Pos5,Pos6\n2024-01-04,1,2,3,4,5,6\n2024-01-07,1,2\n";
        let batch = RawBatch::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(batch.headers.len(), 7);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows[1], vec!["2024-01-07", "1", "2", "", "", "", ""]);
    }

    #[test]
    fn test_csv_rejects_long_rows() {
        let csv = "Date,Pos1\n2024-01-04,1,2\n";
        let result = RawBatch::from_csv_reader(csv.as_bytes());
        assert!(matches!(result, Err(PipelineError::MalformedBatch(_))));
    }

    #[test]
    fn test_json_union_of_keys() {
        let json = br#"[
            {"Date": "2024-01-04", "Pos1": 1, "Pos2": 2},
            {"Date": "2024-01-07", "Pos1": 5.0, "Pos3": null}
        ]"#;
        let batch = RawBatch::from_json_slice(json).unwrap();
        assert_eq!(batch.headers, vec!["Date", "Pos1", "Pos2", "Pos3"]);
        assert_eq!(batch.rows[0], vec!["2024-01-04", "1", "2", ""]);
        assert_eq!(batch.rows[1], vec!["2024-01-07", "5.0", "", ""]);
    }

    #[test]
    fn test_json_must_be_array() {
        let result = RawBatch::from_json_slice(br#"{"Date": "2024-01-04"}"#);
        assert!(matches!(result, Err(PipelineError::MalformedBatch(_))));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(BatchFormat::from_path(Path::new("a/draws.JSON")), BatchFormat::Json);
        assert_eq!(BatchFormat::from_path(Path::new("draws.csv")), BatchFormat::Csv);
        assert_eq!(BatchFormat::from_path(Path::new("draws")), BatchFormat::Csv);
        assert_eq!(BatchFormat::from_path(Path::new("Loto.xlsx")), BatchFormat::Xlsx);
        assert_eq!(BatchFormat::from_path(Path::new("old.XLS")), BatchFormat::Xlsx);
        assert_eq!("json".parse::<BatchFormat>().unwrap(), BatchFormat::Json);
    }

    #[test]
    fn test_format_from_content_type() {
        assert_eq!(
            BatchFormat::from_content_type(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            ),
            BatchFormat::Xlsx
        );
        assert_eq!(
            BatchFormat::from_content_type("application/json; charset=utf-8"),
            BatchFormat::Json
        );
        assert_eq!(BatchFormat::from_content_type("text/csv"), BatchFormat::Csv);
    }

    /// Workbook laid out like the legacy export: `Data` + `Nr.1..Nr.6`,
    /// real date cells and numbers stored as floats.
    fn legacy_workbook() -> Vec<u8> {
        use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("yyyy-mm-dd");
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Data").unwrap();
        for p in 0..6u16 {
            sheet.write_string(0, p + 1, format!("Nr.{}", p + 1)).unwrap();
        }
        let draws = [((2024, 3, 7), [3, 11, 19, 27, 35, 43]), ((2024, 3, 10), [1, 2, 3, 4, 5, 49])];
        for (r, ((y, m, d), numbers)) in draws.iter().enumerate() {
            let row = r as u32 + 1;
            let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
            sheet.write_datetime_with_format(row, 0, &date, &date_format).unwrap();
            for (p, n) in numbers.iter().enumerate() {
                sheet.write_number(row, p as u16 + 1, *n as f64).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_xlsx_first_sheet_with_dates() {
        let batch = RawBatch::from_xlsx_slice(&legacy_workbook()).unwrap();
        assert_eq!(
            batch.headers,
            vec!["Data", "Nr.1", "Nr.2", "Nr.3", "Nr.4", "Nr.5", "Nr.6"]
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.rows[0], vec!["2024-03-07", "3", "11", "19", "27", "35", "43"]);
        assert_eq!(batch.rows[1][0], "2024-03-10");
    }

    #[test]
    fn test_xlsx_garbage_is_malformed() {
        let result = RawBatch::from_bytes(b"definitely not a zip", BatchFormat::Xlsx);
        assert!(matches!(result, Err(PipelineError::MalformedBatch(_))));
    }

    #[test]
    fn test_unreadable_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RawBatch::from_path(&dir.path().join("missing.csv"), BatchFormat::Csv);
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }
}
