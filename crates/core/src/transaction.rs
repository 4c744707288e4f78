use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::category::CategoryId;
use super::error::CoreError;
use super::money::Money;

const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a transaction's current category was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategorySource {
    Manual,
    Rule,
}

impl CategorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            CategorySource::Manual => "manual",
            CategorySource::Rule => "rule",
        }
    }
}

impl FromStr for CategorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CategorySource::Manual),
            "rule" => Ok(CategorySource::Rule),
            other => Err(format!("Unknown category source: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub merchant: Option<String>,
    pub notes: Option<String>,
    pub category_id: Option<CategoryId>,
    pub category_source: Option<CategorySource>,
    pub created_at: String,
}

/// A transaction that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    #[serde(default)]
    pub merchant: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(skip)]
    pub category_source: Option<CategorySource>,
}

impl NewTransaction {
    /// Trims text fields, drops empty optionals and keeps `category_source`
    /// consistent with `category_id`.
    pub fn validate(self) -> Result<NewTransaction, CoreError> {
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(CoreError::Empty("Description"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(CoreError::TooLong {
                field: "Description",
                max: MAX_DESCRIPTION_LEN,
            });
        }

        let category_source = match (self.category_id, self.category_source) {
            (None, _) => None,
            (Some(_), None) => Some(CategorySource::Manual),
            (Some(_), source) => source,
        };

        Ok(NewTransaction {
            date: self.date,
            description,
            amount: self.amount,
            merchant: non_empty(self.merchant),
            notes: non_empty(self.notes),
            category_id: self.category_id,
            category_source,
        })
    }
}

/// Partial update. For nullable fields, an absent key leaves the value alone
/// while an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionUpdate {
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount: Option<Money>,
    #[serde(default, deserialize_with = "double_option")]
    pub merchant: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<CategoryId>>,
}

impl TransactionUpdate {
    /// Merges onto `tx`. Touching the category marks it as manually assigned.
    pub fn apply_to(self, tx: &Transaction) -> Result<NewTransaction, CoreError> {
        let (category_id, category_source) = match self.category_id {
            Some(Some(id)) => (Some(id), Some(CategorySource::Manual)),
            Some(None) => (None, None),
            None => (tx.category_id, tx.category_source),
        };

        NewTransaction {
            date: self.date.unwrap_or(tx.date),
            description: self.description.unwrap_or_else(|| tx.description.clone()),
            amount: self.amount.unwrap_or(tx.amount),
            merchant: self.merchant.unwrap_or_else(|| tx.merchant.clone()),
            notes: self.notes.unwrap_or_else(|| tx.notes.clone()),
            category_id,
            category_source,
        }
        .validate()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn stored() -> Transaction {
        Transaction {
            id: TransactionId(7),
            date: date(2026, 2, 15),
            description: "Coffee".to_string(),
            amount: Money::from_cents(-450),
            merchant: Some("Blue Bottle".to_string()),
            notes: None,
            category_id: Some(CategoryId(2)),
            category_source: Some(CategorySource::Rule),
            created_at: String::new(),
        }
    }

    #[test]
    fn validate_trims_and_drops_empty_optionals() {
        let tx = NewTransaction {
            date: date(2026, 2, 15),
            description: "  Rent ".to_string(),
            amount: Money::from_cents(-150000),
            merchant: Some("   ".to_string()),
            notes: Some(" Feb ".to_string()),
            category_id: None,
            category_source: Some(CategorySource::Rule),
        }
        .validate()
        .unwrap();
        assert_eq!(tx.description, "Rent");
        assert_eq!(tx.merchant, None);
        assert_eq!(tx.notes.as_deref(), Some("Feb"));
        assert_eq!(tx.category_source, None);
    }

    #[test]
    fn validate_rejects_blank_description() {
        let tx = NewTransaction {
            date: date(2026, 2, 15),
            description: " ".to_string(),
            amount: Money::zero(),
            merchant: None,
            notes: None,
            category_id: None,
            category_source: None,
        };
        assert_eq!(tx.validate(), Err(CoreError::Empty("Description")));
    }

    #[test]
    fn update_distinguishes_absent_from_null() {
        let absent: TransactionUpdate = serde_json::from_str(r#"{"notes":"hi"}"#).unwrap();
        let merged = absent.apply_to(&stored()).unwrap();
        assert_eq!(merged.category_id, Some(CategoryId(2)));
        assert_eq!(merged.category_source, Some(CategorySource::Rule));
        assert_eq!(merged.merchant.as_deref(), Some("Blue Bottle"));

        let cleared: TransactionUpdate =
            serde_json::from_str(r#"{"categoryId":null,"merchant":null}"#).unwrap();
        let merged = cleared.apply_to(&stored()).unwrap();
        assert_eq!(merged.category_id, None);
        assert_eq!(merged.category_source, None);
        assert_eq!(merged.merchant, None);
    }

    #[test]
    fn update_setting_category_is_manual() {
        let update: TransactionUpdate = serde_json::from_str(r#"{"categoryId":5}"#).unwrap();
        let merged = update.apply_to(&stored()).unwrap();
        assert_eq!(merged.category_id, Some(CategoryId(5)));
        assert_eq!(merged.category_source, Some(CategorySource::Manual));
    }
}
