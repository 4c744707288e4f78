use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::csv::CsvTable;

/// Which source column feeds each transaction field, by header name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub date: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub debit: Option<String>,
    pub credit: Option<String>,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    /// chrono format tried before the built-in fallbacks.
    pub date_format: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("No column mapped to required field '{0}'")]
    MissingField(&'static str),
    #[error("Map either an amount column or debit/credit columns")]
    MissingAmount,
    #[error("Column '{column}' mapped to '{field}' is not in the file")]
    UnknownColumn { field: &'static str, column: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountColumns {
    Single(usize),
    Split {
        debit: Option<usize>,
        credit: Option<usize>,
    },
}

/// A mapping checked against a table's headers, holding column indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    pub date: usize,
    pub description: usize,
    pub amount: AmountColumns,
    pub merchant: Option<usize>,
    pub notes: Option<usize>,
    pub date_format: Option<String>,
}

const DATE_PATTERNS: &[&str] = &["date", "transaction date", "trans date", "posted", "post date", "booking date", "dt"];
const AMOUNT_PATTERNS: &[&str] = &["amount", "amt", "total", "value", "sum"];
const DEBIT_PATTERNS: &[&str] = &["debit", "dr", "withdrawal", "withdrawals", "money out", "paid out"];
const CREDIT_PATTERNS: &[&str] = &["credit", "cr", "deposit", "deposits", "money in", "paid in"];
const MERCHANT_PATTERNS: &[&str] = &["merchant", "payee", "vendor", "counterparty", "store"];
const NOTES_PATTERNS: &[&str] = &["notes", "note", "memo", "comment", "comments", "remarks"];
const DESCRIPTION_PATTERNS: &[&str] = &["description", "desc", "details", "narration", "narrative", "transaction", "particulars"];
const DESCRIPTION_FALLBACK_PATTERNS: &[&str] = &["name", "reference", "ref", "type"];

impl ColumnMapping {
    /// Best-guess mapping from header names. Each column is used at most once.
    pub fn detect(headers: &[String]) -> ColumnMapping {
        let mut taken = Vec::new();

        let date = pick(headers, &mut taken, |h| header_matches(h, DATE_PATTERNS));

        // A plain amount column wins over debit/credit pairs; "Debit Amount"
        // must not be mistaken for it.
        let amount = pick(headers, &mut taken, |h| {
            header_matches(h, AMOUNT_PATTERNS)
                && !header_matches(h, DEBIT_PATTERNS)
                && !header_matches(h, CREDIT_PATTERNS)
        });
        let (debit, credit) = if amount.is_none() {
            (
                pick(headers, &mut taken, |h| header_matches(h, DEBIT_PATTERNS)),
                pick(headers, &mut taken, |h| header_matches(h, CREDIT_PATTERNS)),
            )
        } else {
            (None, None)
        };

        let merchant = pick(headers, &mut taken, |h| header_matches(h, MERCHANT_PATTERNS));
        let notes = pick(headers, &mut taken, |h| header_matches(h, NOTES_PATTERNS));
        let description = pick(headers, &mut taken, |h| header_matches(h, DESCRIPTION_PATTERNS))
            .or_else(|| {
                pick(headers, &mut taken, |h| {
                    header_matches(h, DESCRIPTION_FALLBACK_PATTERNS)
                })
            });

        ColumnMapping {
            date,
            description,
            amount,
            debit,
            credit,
            merchant,
            notes,
            date_format: None,
        }
    }

    pub fn resolve(&self, table: &CsvTable) -> Result<ResolvedMapping, MappingError> {
        let lookup = |field: &'static str, column: &Option<String>| -> Result<Option<usize>, MappingError> {
            match column.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
                None => Ok(None),
                Some(name) => table
                    .column_index(name)
                    .map(Some)
                    .ok_or_else(|| MappingError::UnknownColumn {
                        field,
                        column: name.to_string(),
                    }),
            }
        };

        let date = lookup("date", &self.date)?.ok_or(MappingError::MissingField("date"))?;
        let description = lookup("description", &self.description)?
            .ok_or(MappingError::MissingField("description"))?;

        let amount = match lookup("amount", &self.amount)? {
            Some(col) => AmountColumns::Single(col),
            None => {
                let debit = lookup("debit", &self.debit)?;
                let credit = lookup("credit", &self.credit)?;
                if debit.is_none() && credit.is_none() {
                    return Err(MappingError::MissingAmount);
                }
                AmountColumns::Split { debit, credit }
            }
        };

        Ok(ResolvedMapping {
            date,
            description,
            amount,
            merchant: lookup("merchant", &self.merchant)?,
            notes: lookup("notes", &self.notes)?,
            date_format: self
                .date_format
                .as_deref()
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string),
        })
    }
}

fn pick(headers: &[String], taken: &mut Vec<usize>, accept: impl Fn(&str) -> bool) -> Option<String> {
    let (idx, header) = headers
        .iter()
        .enumerate()
        .find(|(i, h)| !taken.contains(i) && accept(h.as_str()))?;
    taken.push(idx);
    Some(header.clone())
}

/// Multi-word patterns match as substrings of the normalized header; single
/// words must match a whole word, so "dr" does not hit "Address".
fn header_matches(header: &str, patterns: &[&str]) -> bool {
    let normalized = header
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    patterns.iter().any(|p| {
        if p.contains(' ') {
            normalized.contains(p)
        } else {
            normalized.split(' ').any(|w| w == *p)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn table(names: &[&str]) -> CsvTable {
        CsvTable {
            headers: headers(names),
            rows: vec![vec![String::new(); names.len()]],
        }
    }

    #[test]
    fn detect_standard_export() {
        let m = ColumnMapping::detect(&headers(&["Date", "Description", "Amount", "Merchant", "Notes"]));
        assert_eq!(m.date.as_deref(), Some("Date"));
        assert_eq!(m.description.as_deref(), Some("Description"));
        assert_eq!(m.amount.as_deref(), Some("Amount"));
        assert_eq!(m.merchant.as_deref(), Some("Merchant"));
        assert_eq!(m.notes.as_deref(), Some("Notes"));
        assert_eq!(m.debit, None);
    }

    #[test]
    fn detect_debit_credit_bank_export() {
        let m = ColumnMapping::detect(&headers(&[
            "Transaction Date",
            "Details",
            "Debit Amount",
            "Credit Amount",
            "Address",
        ]));
        assert_eq!(m.date.as_deref(), Some("Transaction Date"));
        assert_eq!(m.description.as_deref(), Some("Details"));
        assert_eq!(m.amount, None);
        assert_eq!(m.debit.as_deref(), Some("Debit Amount"));
        assert_eq!(m.credit.as_deref(), Some("Credit Amount"));
    }

    #[test]
    fn detect_description_fallback() {
        let m = ColumnMapping::detect(&headers(&["Posted", "Name", "Amt"]));
        assert_eq!(m.date.as_deref(), Some("Posted"));
        assert_eq!(m.description.as_deref(), Some("Name"));
        assert_eq!(m.amount.as_deref(), Some("Amt"));
    }

    #[test]
    fn resolve_requires_date_and_description() {
        let t = table(&["Date", "Amount"]);
        let mapping = ColumnMapping {
            date: Some("Date".to_string()),
            amount: Some("Amount".to_string()),
            ..ColumnMapping::default()
        };
        assert_eq!(mapping.resolve(&t), Err(MappingError::MissingField("description")));
    }

    #[test]
    fn resolve_requires_some_amount_column() {
        let t = table(&["Date", "Description"]);
        let mapping = ColumnMapping {
            date: Some("Date".to_string()),
            description: Some("Description".to_string()),
            ..ColumnMapping::default()
        };
        assert_eq!(mapping.resolve(&t), Err(MappingError::MissingAmount));
    }

    #[test]
    fn resolve_rejects_unknown_column() {
        let t = table(&["Date", "Description", "Amount"]);
        let mapping = ColumnMapping {
            date: Some("Date".to_string()),
            description: Some("Description".to_string()),
            amount: Some("Value".to_string()),
            ..ColumnMapping::default()
        };
        assert!(matches!(
            mapping.resolve(&t),
            Err(MappingError::UnknownColumn { field: "amount", .. })
        ));
    }

    #[test]
    fn resolve_indices_and_blank_format() {
        let t = table(&["Amount", "Date", "Description", "Merchant"]);
        let mapping = ColumnMapping {
            date: Some("date".to_string()),
            description: Some("Description".to_string()),
            amount: Some("Amount".to_string()),
            merchant: Some("Merchant".to_string()),
            notes: Some(String::new()),
            date_format: Some("  ".to_string()),
            ..ColumnMapping::default()
        };
        let resolved = mapping.resolve(&t).unwrap();
        assert_eq!(resolved.date, 1);
        assert_eq!(resolved.description, 2);
        assert_eq!(resolved.amount, AmountColumns::Single(0));
        assert_eq!(resolved.merchant, Some(3));
        assert_eq!(resolved.notes, None);
        assert_eq!(resolved.date_format, None);
    }
}
