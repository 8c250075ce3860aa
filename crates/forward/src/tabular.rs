//! CSV → JSON rows.
//!
//! Cells that look like plain decimal numbers become JSON numbers; everything else stays a
//! string. Signs, exponents and thousands separators are not recognised.

use crate::error::TabularError;
use serde_json::{Map, Number, Value};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Read `path` as a headed CSV file and return one JSON object per data row.
///
/// # Errors
///
/// Returns an error if the path does not exist, is not a regular file, cannot be read, or is
/// not valid CSV.
pub fn read_csv_rows(path: &Path) -> Result<Vec<Map<String, Value>>, TabularError> {
    let shown = path.display().to_string();
    let meta = std::fs::metadata(path).map_err(|e| io_error(e, &shown))?;
    if !meta.is_file() {
        return Err(TabularError::NotAFile(shown));
    }

    let content = std::fs::read_to_string(path).map_err(|e| io_error(e, &shown))?;
    let rows = parse_csv_rows(&content)?;
    debug!(path = %shown, rows = rows.len(), "converted CSV to JSON rows");
    Ok(rows)
}

/// Parse CSV text (first record is the header) into JSON rows.
///
/// Keys follow the header's column order. Cells missing from a short record are `null`.
///
/// # Errors
///
/// Returns an error if the text is not valid CSV.
pub fn parse_csv_rows(content: &str) -> Result<Vec<Map<String, Value>>, TabularError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (i, key) in headers.iter().enumerate() {
            let value = record.get(i).map_or(Value::Null, coerce_cell);
            row.insert(key.to_string(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Integer for all-digit cells, float for digits with exactly one `.`, string otherwise.
#[must_use]
pub fn coerce_cell(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::String(String::new());
    }

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());

    if digits_only(cell) {
        if let Ok(n) = cell.parse::<u64>() {
            return Value::Number(n.into());
        }
        return Value::String(cell.to_string());
    }

    let dots = cell.bytes().filter(|b| *b == b'.').count();
    if dots == 1 && cell.len() > 1 && digits_only(&cell.replacen('.', "", 1)) {
        if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }

    Value::String(cell.to_string())
}

fn io_error(e: std::io::Error, shown: &str) -> TabularError {
    match e.kind() {
        ErrorKind::NotFound => TabularError::NotFound(shown.to_string()),
        ErrorKind::PermissionDenied => TabularError::PermissionDenied(shown.to_string()),
        _ => TabularError::Read(e),
    }
}
