use categorizer_core::{Money, NewTransaction};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::csv::{parse_amount, parse_date, CsvTable};
use crate::mapping::{AmountColumns, ResolvedMapping};

/// A data row that passed validation. `row` is 1-based, counting data rows
/// after the header.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
    pub row: usize,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    /// Looks like a transaction already stored or earlier in the same file.
    pub duplicate: bool,
}

impl ImportRow {
    pub fn to_new_transaction(&self) -> NewTransaction {
        NewTransaction {
            date: self.date,
            description: self.description.clone(),
            amount: self.amount,
            merchant: self.merchant.clone(),
            notes: self.notes.clone(),
            category_id: None,
            category_source: None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowIssue {
    #[error("Missing date")]
    MissingDate,
    #[error("Invalid date '{0}'")]
    InvalidDate(String),
    #[error("Missing description")]
    MissingDescription,
    #[error("Missing amount")]
    MissingAmount,
    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),
    #[error("Both debit and credit are filled in")]
    ConflictingAmounts,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub row: usize,
    pub reasons: Vec<String>,
}

/// Valid/invalid partition of a table's rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: Vec<ImportRow>,
    pub errors: Vec<RowError>,
}

impl ValidationReport {
    pub fn valid_count(&self) -> usize {
        self.valid.len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn duplicate_count(&self) -> usize {
        self.valid.iter().filter(|r| r.duplicate).count()
    }

    /// Inclusive date span of the valid rows.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.valid.first()?.date;
        Some(self.valid.iter().fold((first, first), |(lo, hi), r| {
            (lo.min(r.date), hi.max(r.date))
        }))
    }
}

pub fn validate_rows(table: &CsvTable, mapping: &ResolvedMapping) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (idx, record) in table.rows.iter().enumerate() {
        let row = idx + 1;
        match validate_row(record, mapping) {
            Ok(parsed) => report.valid.push(ImportRow { row, ..parsed }),
            Err(issues) => report.errors.push(RowError {
                row,
                reasons: issues.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    report
}

/// Collects every problem with a row instead of stopping at the first one.
fn validate_row(record: &[String], mapping: &ResolvedMapping) -> Result<ImportRow, Vec<RowIssue>> {
    let cell = |col: usize| record.get(col).map(|s| s.trim()).filter(|s| !s.is_empty());
    let mut issues = Vec::new();

    let date = match cell(mapping.date) {
        None => {
            issues.push(RowIssue::MissingDate);
            None
        }
        Some(raw) => match parse_date(raw, mapping.date_format.as_deref()) {
            Ok(d) => Some(d),
            Err(_) => {
                issues.push(RowIssue::InvalidDate(raw.to_string()));
                None
            }
        },
    };

    let description = cell(mapping.description);
    if description.is_none() {
        issues.push(RowIssue::MissingDescription);
    }

    let amount = match read_amount(mapping.amount, &cell) {
        Ok(a) => Some(a),
        Err(issue) => {
            issues.push(issue);
            None
        }
    };

    match (date, description, amount) {
        (Some(date), Some(description), Some(amount)) if issues.is_empty() => Ok(ImportRow {
            row: 0,
            date,
            description: description.to_string(),
            amount,
            merchant: mapping.merchant.and_then(cell).map(str::to_string),
            notes: mapping.notes.and_then(cell).map(str::to_string),
            duplicate: false,
        }),
        _ => Err(issues),
    }
}

/// Single amount columns are taken as signed. With split columns, debits are
/// outflows (negative) and credits inflows.
fn read_amount<'a>(
    columns: AmountColumns,
    cell: &impl Fn(usize) -> Option<&'a str>,
) -> Result<Money, RowIssue> {
    let parse = |raw: &str| parse_amount(raw).map_err(|_| RowIssue::InvalidAmount(raw.to_string()));

    match columns {
        AmountColumns::Single(col) => parse(cell(col).ok_or(RowIssue::MissingAmount)?),
        AmountColumns::Split { debit, credit } => {
            let debit = debit.and_then(cell).map(parse).transpose()?;
            let credit = credit.and_then(cell).map(parse).transpose()?;
            match (debit, credit) {
                (Some(d), None) => Ok(-d.abs()),
                (None, Some(c)) => Ok(c.abs()),
                (Some(d), Some(c)) if d.is_zero() => Ok(c.abs()),
                (Some(d), Some(c)) if c.is_zero() => Ok(-d.abs()),
                (Some(_), Some(_)) => Err(RowIssue::ConflictingAmounts),
                (None, None) => Err(RowIssue::MissingAmount),
            }
        }
    }
}
