use categorizer_core::Money;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;
use thiserror::Error;

/// Raw contents of an uploaded CSV file: header names plus data rows as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .or_else(|| {
                let wanted = name.trim().to_lowercase();
                self.headers
                    .iter()
                    .position(|h| h.trim().to_lowercase() == wanted)
            })
    }

    pub fn preview(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..self.rows.len().min(n)]
    }
}

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("File is not valid UTF-8 text")]
    NotUtf8,
    #[error("File has no header row")]
    MissingHeader,
    #[error("Invalid date format: {0}")]
    InvalidDate(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("No data rows")]
    NoDataRows,
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%d.%m.%Y", "%m/%d/%y",
    "%b %d, %Y", "%d %b %Y",
];

/// Reads an uploaded file, stripping a UTF-8 BOM and sniffing the delimiter.
pub fn read_table(bytes: &[u8]) -> Result<CsvTable, CsvError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes).map_err(|_| CsvError::NotUtf8)?;
    let delimiter = detect_delimiter(text);
    read_table_with(text.as_bytes(), delimiter)
}

pub fn read_table_with<R: Read>(data: R, delimiter: u8) -> Result<CsvTable, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.iter().all(|h| h.is_empty()) {
        return Err(CsvError::MissingHeader);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(CsvError::NoDataRows);
    }

    Ok(CsvTable { headers, rows })
}

/// Picks whichever of `,`, `;` or tab occurs most often outside quotes on the
/// first line. Ties go to the comma.
fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or_default();
    let mut counts = [(b',', 0usize), (b';', 0), (b'\t', 0)];
    let mut in_quotes = false;
    for c in first_line.bytes() {
        if c == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(entry) = counts.iter_mut().find(|(d, _)| *d == c) {
            entry.1 += 1;
        }
    }
    counts
        .iter()
        .fold((b',', 0), |best, &(d, n)| if n > best.1 { (d, n) } else { best })
        .0
}

pub(crate) fn parse_date(s: &str, format: Option<&str>) -> Result<NaiveDate, CsvError> {
    let s = s.trim();

    if let Some(format) = format {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return Ok(date);
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(CsvError::InvalidDate(s.to_string()))
}

pub(crate) fn parse_amount(s: &str) -> Result<Money, CsvError> {
    let s = s.trim();
    let (negative, body) = if s.starts_with('(') && s.ends_with(')') {
        (true, &s[1..s.len() - 1])
    } else {
        (false, s)
    };
    let cleaned: String = body.chars().filter(|c| !matches!(c, '$' | ' ')).collect();
    let mut dec = Decimal::from_str(&normalize_separators(&cleaned))
        .map_err(|_| CsvError::InvalidAmount(s.to_string()))?;
    if negative {
        dec = -dec;
    }
    Money::try_from_decimal(dec).map_err(|_| CsvError::InvalidAmount(s.to_string()))
}

/// A trailing comma followed by one or two digits is a decimal comma
/// (`-4,50`, `1.234,56`). Otherwise commas group thousands.
fn normalize_separators(s: &str) -> String {
    if let Some(pos) = s.rfind([',', '.']) {
        let fraction = &s[pos + 1..];
        let decimal_comma = s[pos..].starts_with(',')
            && (1..=2).contains(&fraction.len())
            && fraction.bytes().all(|b| b.is_ascii_digit());
        if decimal_comma {
            return format!("{}.{}", s[..pos].replace(['.', ','], ""), fraction);
        }
    }
    s.replace(',', "")
}
