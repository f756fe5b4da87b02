//! Tabular file parsing with automatic type inference.
//!
//! Parses CSV, TSV, XLS, and XLSX uploads into rows of typed cells and decides a
//! SQLite storage type per column, so that aggregates over ingested numeric columns
//! behave numerically.
//!
//! ## Preprocessing
//! - Missing values normalized to NULL
//! - Currency symbols and thousands separators stripped from numbers
//! - Accounting negatives `(123)` become `-123`
//! - Dates normalized to ISO-8601 text

use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::plan::sanitize_identifier;

/// A typed value from a tabular cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl TypedValue {
    /// Get the column type for this value (ignoring Null).
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            TypedValue::Null => None,
            TypedValue::Int(_) => Some(ColumnType::Integer),
            TypedValue::Float(_) => Some(ColumnType::Real),
            TypedValue::Text(_) => Some(ColumnType::Text),
        }
    }
}

/// Storage type of an ingested column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_type())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Sanitized identifier used as the SQL column name.
    pub name: String,
    /// Header as it appeared in the file.
    pub original_name: String,
    pub column_type: ColumnType,
    pub null_count: usize,
}

/// Parsed upload ready for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabularFileData {
    /// File name only (used for the table name and the manifest).
    pub file_name: String,
    pub columns: Vec<ColumnInfo>,
    /// Rows of typed values, padded or truncated to the column count.
    pub rows: Vec<Vec<TypedValue>>,
    pub row_count: usize,
}

impl TabularFileData {
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.rows.is_empty()
    }
}

/// Parse an uploaded file body. The format is chosen from the file name extension.
pub fn parse_tabular_bytes(file_name: &str, bytes: &[u8]) -> Result<TabularFileData, StoreError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    let (headers, raw_rows) = match extension.as_str() {
        "csv" => parse_csv(bytes, b',')?,
        "tsv" => parse_csv(bytes, b'\t')?,
        "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => parse_excel(bytes)?,
        _ => parse_csv_auto_detect(bytes)?,
    };

    let column_count = headers.len();
    let typed_rows: Vec<Vec<TypedValue>> = raw_rows
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            (0..column_count)
                .map(|i| row.get(i).map(|c| infer_and_convert(c)).unwrap_or(TypedValue::Null))
                .collect()
        })
        .collect();

    let names = sanitize_headers(&headers);
    let columns = analyze_columns(&headers, &names, &typed_rows);

    Ok(TabularFileData {
        file_name: file_name.to_string(),
        row_count: typed_rows.len(),
        rows: typed_rows,
        columns,
    })
}

/// Parse CSV/TSV content with the given delimiter.
fn parse_csv(bytes: &[u8], delimiter: u8) -> Result<(Vec<String>, Vec<Vec<String>>), StoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| StoreError::Ingest(format!("Failed to read CSV headers: {}", e)))?
        .iter()
        .map(|s| s.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record =
            result.map_err(|e| StoreError::Ingest(format!("Failed to read CSV row: {}", e)))?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }

    Ok((headers, rows))
}

/// Pick the delimiter from the first line and parse.
fn parse_csv_auto_detect(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), StoreError> {
    let content = String::from_utf8_lossy(bytes);
    let first_line = content.lines().next().unwrap_or("");

    let comma_count = first_line.matches(',').count();
    let tab_count = first_line.matches('\t').count();
    let semicolon_count = first_line.matches(';').count();

    let delimiter = if tab_count > comma_count && tab_count > semicolon_count {
        b'\t'
    } else if semicolon_count > comma_count {
        b';'
    } else {
        b','
    };

    parse_csv(bytes, delimiter)
}

/// First worksheet only; first row is the header.
fn parse_excel(bytes: &[u8]) -> Result<(Vec<String>, Vec<Vec<String>>), StoreError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| StoreError::Ingest(format!("Failed to open spreadsheet: {}", e)))?;

    let sheet_names = workbook.sheet_names().to_vec();
    let sheet_name = sheet_names
        .first()
        .ok_or_else(|| StoreError::Ingest("Spreadsheet has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| StoreError::Ingest(format!("Failed to read worksheet: {}", e)))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .map(|row| row.iter().map(excel_cell_to_string).collect())
        .unwrap_or_default();
    let rows: Vec<Vec<String>> = rows_iter
        .map(|row| row.iter().map(excel_cell_to_string).collect())
        .collect();

    Ok((headers, rows))
}

fn excel_cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{:.0}", f)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => format!("{}", dt),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

// ============ Column Names ============

/// Sanitize headers into unique SQL identifiers.
///
/// Empty names become `col_<index>`; repeats get `_2`, `_3`, ... suffixes.
pub fn sanitize_headers(headers: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names = Vec::with_capacity(headers.len());

    for (i, header) in headers.iter().enumerate() {
        let base = sanitize_identifier(header, &format!("col_{}", i));
        let mut candidate = base.clone();
        let mut suffix = 2;
        while seen.contains(&candidate.to_lowercase()) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.insert(candidate.to_lowercase());
        names.push(candidate);
    }

    names
}

// ============ Type Inference ============

/// Infer type and convert a raw string value to a TypedValue.
fn infer_and_convert(raw: &str) -> TypedValue {
    let trimmed = raw.trim();

    if is_missing_value(trimmed) {
        return TypedValue::Null;
    }
    if let Some(num) = try_parse_numeric(trimmed) {
        return num;
    }
    if let Some(dt) = try_parse_datetime(trimmed) {
        return TypedValue::Text(dt);
    }
    TypedValue::Text(trimmed.to_string())
}

fn is_missing_value(s: &str) -> bool {
    if s.is_empty() {
        return true;
    }

    let lower = s.to_lowercase();
    matches!(
        lower.as_str(),
        "n/a" | "na" | "null" | "nil" | "none" | "-" | "--" | "." | "#n/a" | "#null" | "nan"
    )
}

/// Try to parse a numeric value, handling currency and accounting negatives.
fn try_parse_numeric(s: &str) -> Option<TypedValue> {
    let mut cleaned = s.to_string();

    let currency_chars = ['$', '€', '£', '¥', '₹', '₽', '₩', '฿'];
    for c in &currency_chars {
        cleaned = cleaned.replace(*c, "");
    }

    // Thousands separators
    cleaned = cleaned.replace(',', "");

    if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2 {
        cleaned = format!("-{}", &cleaned[1..cleaned.len() - 1]);
    }

    cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        return None;
    }

    if let Ok(i) = cleaned.parse::<i64>() {
        return Some(TypedValue::Int(i));
    }

    if let Ok(f) = cleaned.parse::<f64>() {
        if f.is_finite() {
            return Some(TypedValue::Float(f));
        }
    }

    None
}

/// Try to parse a date or datetime and return it as ISO text.
fn try_parse_datetime(s: &str) -> Option<String> {
    let datetime_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
        "%d.%m.%Y %H:%M:%S",
    ];

    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
    }

    let date_formats = [
        "%Y-%m-%d",
        "%m/%d/%Y",
        "%m/%d/%y",
        "%d.%m.%Y",
        "%b %d, %Y",
        "%B %d, %Y",
        "%d %b %Y",
        "%d %B %Y",
    ];

    for fmt in &date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }

    None
}

// ============ Column Analysis ============

/// Decide each column's storage type from its non-missing cells.
///
/// All-integer columns are INTEGER, integer/float mixes are REAL, anything
/// with text (or no values at all) is TEXT.
fn analyze_columns(
    headers: &[String],
    names: &[String],
    rows: &[Vec<TypedValue>],
) -> Vec<ColumnInfo> {
    headers
        .iter()
        .zip(names.iter())
        .enumerate()
        .map(|(col_idx, (header, name))| {
            let mut has_int = false;
            let mut has_float = false;
            let mut has_text = false;
            let mut null_count = 0;

            for row in rows {
                match row.get(col_idx).and_then(TypedValue::column_type) {
                    Some(ColumnType::Integer) => has_int = true,
                    Some(ColumnType::Real) => has_float = true,
                    Some(ColumnType::Text) => has_text = true,
                    None => null_count += 1,
                }
            }

            let column_type = if has_text || (!has_int && !has_float) {
                ColumnType::Text
            } else if has_float {
                ColumnType::Real
            } else {
                ColumnType::Integer
            };

            ColumnInfo {
                name: name.clone(),
                original_name: header.clone(),
                column_type,
                null_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing_value() {
        assert!(is_missing_value(""));
        assert!(is_missing_value("N/A"));
        assert!(is_missing_value("null"));
        assert!(is_missing_value("NULL"));
        assert!(is_missing_value("-"));
        assert!(is_missing_value("NaN"));
        assert!(!is_missing_value("0"));
        assert!(!is_missing_value("hello"));
    }

    #[test]
    fn test_try_parse_numeric() {
        assert_eq!(try_parse_numeric("123"), Some(TypedValue::Int(123)));
        assert_eq!(try_parse_numeric("-456"), Some(TypedValue::Int(-456)));
        assert_eq!(try_parse_numeric("12.34"), Some(TypedValue::Float(12.34)));
        assert_eq!(try_parse_numeric("$1,234.56"), Some(TypedValue::Float(1234.56)));
        assert_eq!(try_parse_numeric("£1,000"), Some(TypedValue::Int(1000)));
        assert_eq!(try_parse_numeric("(123)"), Some(TypedValue::Int(-123)));
        assert_eq!(try_parse_numeric("$"), None);
        assert_eq!(try_parse_numeric("west"), None);
    }

    #[test]
    fn test_try_parse_datetime() {
        assert_eq!(try_parse_datetime("2024-01-15"), Some("2024-01-15".to_string()));
        assert_eq!(try_parse_datetime("01/15/2024"), Some("2024-01-15".to_string()));
        assert_eq!(
            try_parse_datetime("2024-01-15 14:30:00"),
            Some("2024-01-15T14:30:00".to_string())
        );
        assert_eq!(try_parse_datetime("north"), None);
    }

    #[test]
    fn test_sanitize_headers() {
        let headers = vec![
            "Region".to_string(),
            "Unit Price ($)".to_string(),
            "".to_string(),
            "2024".to_string(),
            "region".to_string(),
            "Region".to_string(),
        ];
        assert_eq!(
            sanitize_headers(&headers),
            vec!["Region", "Unit_Price____", "col_2", "c_2024", "region_2", "Region_3"]
        );
    }

    #[test]
    fn test_parse_csv_bytes_infers_types() {
        let body = b"region,revenue,units,note\nwest,\"$1,200.50\",3,first\neast,800,N/A,\n\nnorth,100,7,x\n";
        let data = parse_tabular_bytes("sales.csv", body).unwrap();

        assert_eq!(data.column_names(), vec!["region", "revenue", "units", "note"]);
        assert_eq!(data.row_count, 3);
        assert_eq!(data.columns[0].column_type, ColumnType::Text);
        assert_eq!(data.columns[1].column_type, ColumnType::Real);
        assert_eq!(data.columns[2].column_type, ColumnType::Integer);
        assert_eq!(data.columns[2].null_count, 1);
        assert_eq!(data.rows[0][1], TypedValue::Float(1200.5));
        assert_eq!(data.rows[1][3], TypedValue::Null);
    }

    #[test]
    fn test_parse_tsv_and_semicolon_detection() {
        let tsv = parse_tabular_bytes("t.tsv", b"a\tb\n1\t2\n").unwrap();
        assert_eq!(tsv.column_names(), vec!["a", "b"]);

        let semicolons = parse_tabular_bytes("upload", b"a;b;c\n1;2;3\n").unwrap();
        assert_eq!(semicolons.column_names(), vec!["a", "b", "c"]);
        assert_eq!(semicolons.rows[0][2], TypedValue::Int(3));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let data = parse_tabular_bytes("x.csv", b"a,b,c\n1\n").unwrap();
        assert_eq!(
            data.rows[0],
            vec![TypedValue::Int(1), TypedValue::Null, TypedValue::Null]
        );
    }

    #[test]
    fn test_header_only_file_is_empty() {
        let data = parse_tabular_bytes("x.csv", b"a,b\n").unwrap();
        assert!(data.is_empty());
        assert_eq!(data.row_count, 0);
    }
}
