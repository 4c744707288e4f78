use categorizer_core::{Money, Transaction};
use chrono::NaiveDate;

use crate::util::{levenshtein_distance, normalize_words};
use crate::validate::ImportRow;

/// Minimum description similarity for two same-day, same-amount entries to
/// count as the same transaction.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;

/// The parts of a transaction used to recognise it again in a later import.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
}

impl From<&Transaction> for Fingerprint {
    fn from(tx: &Transaction) -> Self {
        Fingerprint {
            date: tx.date,
            description: tx.description.clone(),
            amount: tx.amount,
        }
    }
}

impl From<&ImportRow> for Fingerprint {
    fn from(row: &ImportRow) -> Self {
        Fingerprint {
            date: row.date,
            description: row.description.clone(),
            amount: row.amount,
        }
    }
}

impl Fingerprint {
    pub fn matches(&self, other: &Fingerprint, threshold: f32) -> bool {
        self.date == other.date
            && self.amount == other.amount
            && description_similarity(&self.description, &other.description) >= threshold
    }
}

/// Marks rows that repeat a stored transaction or an earlier row of the same
/// file. Returns how many were flagged.
pub fn flag_duplicates(rows: &mut [ImportRow], existing: &[Fingerprint], threshold: f32) -> usize {
    let mut seen: Vec<Fingerprint> = Vec::with_capacity(rows.len());
    let mut flagged = 0;

    for row in rows.iter_mut() {
        let fp = Fingerprint::from(&*row);
        row.duplicate = existing
            .iter()
            .chain(seen.iter())
            .any(|other| fp.matches(other, threshold));
        if row.duplicate {
            flagged += 1;
        }
        seen.push(fp);
    }

    flagged
}

/// Normalises a description to lowercase alphanumeric words and computes
/// Levenshtein similarity in the range [0.0, 1.0].
pub fn description_similarity(s1: &str, s2: &str) -> f32 {
    let a = normalize_words(s1);
    let b = normalize_words(s2);

    if a == b {
        return 1.0;
    }

    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }

    1.0 - (levenshtein_distance(&a, &b) as f32 / max_len as f32)
}
