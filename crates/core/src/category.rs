use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::CoreError;

const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub color: Option<String>,
    pub created_at: String,
}

/// Input for creating or renaming a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewCategory {
    pub fn new(name: &str, color: Option<&str>) -> Self {
        NewCategory {
            name: name.to_string(),
            color: color.map(str::to_string),
        }
    }

    /// Trims the name and normalizes an empty color to `None`.
    pub fn validate(self) -> Result<NewCategory, CoreError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::Empty("Category name"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::TooLong {
                field: "Category name",
                max: MAX_NAME_LEN,
            });
        }

        let color = match self.color.map(|c| c.trim().to_string()) {
            Some(c) if c.is_empty() => None,
            Some(c) if is_hex_color(&c) => Some(c.to_lowercase()),
            Some(c) => return Err(CoreError::InvalidColor(c)),
            None => None,
        };

        Ok(NewCategory { name, color })
    }
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Categories created on a fresh database.
pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Groceries", "#4caf50"),
    ("Dining", "#ff9800"),
    ("Transport", "#2196f3"),
    ("Housing", "#795548"),
    ("Utilities", "#607d8b"),
    ("Entertainment", "#9c27b0"),
    ("Shopping", "#e91e63"),
    ("Health", "#f44336"),
    ("Travel", "#00bcd4"),
    ("Income", "#8bc34a"),
    ("Transfers", "#9e9e9e"),
    ("Other", "#bdbdbd"),
];
