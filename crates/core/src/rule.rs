use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::category::CategoryId;
use super::error::CoreError;

const MAX_NAME_LEN: usize = 100;
const MAX_VALUE_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub i64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction attribute a rule inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleField {
    Description,
    Merchant,
    Notes,
    Amount,
}

impl RuleField {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleField::Description => "description",
            RuleField::Merchant => "merchant",
            RuleField::Notes => "notes",
            RuleField::Amount => "amount",
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleField {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "description" => Ok(RuleField::Description),
            "merchant" => Ok(RuleField::Merchant),
            "notes" => Ok(RuleField::Notes),
            "amount" => Ok(RuleField::Amount),
            other => Err(CoreError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleOperator {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
    Regex,
    GreaterThan,
    LessThan,
}

impl RuleOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleOperator::Contains => "contains",
            RuleOperator::StartsWith => "startsWith",
            RuleOperator::EndsWith => "endsWith",
            RuleOperator::Equals => "equals",
            RuleOperator::Regex => "regex",
            RuleOperator::GreaterThan => "greaterThan",
            RuleOperator::LessThan => "lessThan",
        }
    }
}

impl fmt::Display for RuleOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleOperator {
    type Err = CoreError;

    /// Accepts the camelCase wire names as well as snake_case spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "").as_str() {
            "contains" => Ok(RuleOperator::Contains),
            "startswith" => Ok(RuleOperator::StartsWith),
            "endswith" => Ok(RuleOperator::EndsWith),
            "equals" => Ok(RuleOperator::Equals),
            "regex" => Ok(RuleOperator::Regex),
            "greaterthan" => Ok(RuleOperator::GreaterThan),
            "lessthan" => Ok(RuleOperator::LessThan),
            _ => Err(CoreError::UnknownOperator(s.trim().to_string())),
        }
    }
}

/// A parsed, ready-to-evaluate rule condition.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Case-insensitive text comparison. `needle` is already lowercased.
    Text {
        field: RuleField,
        operator: RuleOperator,
        needle: String,
    },
    /// Case-insensitive regular expression.
    Pattern { field: RuleField, regex: Regex },
    /// Numeric comparison against the transaction amount.
    Amount {
        operator: RuleOperator,
        threshold: Decimal,
    },
}

impl Condition {
    pub fn parse(field: &str, operator: &str, value: &str) -> Result<Condition, CoreError> {
        let field = RuleField::from_str(field)?;
        let operator = RuleOperator::from_str(operator)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(CoreError::Empty("Rule value"));
        }

        match operator {
            RuleOperator::Regex => {
                let regex = RegexBuilder::new(value)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| CoreError::InvalidPattern(e.to_string()))?;
                Ok(Condition::Pattern { field, regex })
            }
            RuleOperator::GreaterThan | RuleOperator::LessThan if field != RuleField::Amount => {
                Err(CoreError::OperatorFieldMismatch {
                    operator: operator.to_string(),
                    field: field.to_string(),
                })
            }
            RuleOperator::GreaterThan | RuleOperator::LessThan | RuleOperator::Equals
                if field == RuleField::Amount =>
            {
                let threshold = parse_threshold(value)?;
                Ok(Condition::Amount { operator, threshold })
            }
            _ => Ok(Condition::Text {
                field,
                operator,
                needle: value.to_lowercase(),
            }),
        }
    }

    pub fn field(&self) -> RuleField {
        match self {
            Condition::Text { field, .. } | Condition::Pattern { field, .. } => *field,
            Condition::Amount { .. } => RuleField::Amount,
        }
    }
}

fn parse_threshold(value: &str) -> Result<Decimal, CoreError> {
    let cleaned = value.replace([',', '$', ' '], "");
    Decimal::from_str(&cleaned).map_err(|_| CoreError::InvalidAmount(value.to_string()))
}

/// A stored categorization rule.
///
/// `field` and `operator` stay as raw text so rows written with values this
/// build does not understand can still be listed and edited; the matcher skips
/// them instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub field: String,
    pub operator: String,
    pub value: String,
    pub category_id: CategoryId,
    pub priority: i32,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Rule {
    pub fn condition(&self) -> Result<Condition, CoreError> {
        Condition::parse(&self.field, &self.operator, &self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnvalidatedRule {
    pub name: String,
    pub field: String,
    pub operator: String,
    pub value: String,
    pub category_id: CategoryId,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub field: Option<String>,
    pub operator: Option<String>,
    pub value: Option<String>,
    pub category_id: Option<CategoryId>,
    pub priority: Option<i32>,
    pub active: Option<bool>,
}

impl RuleUpdate {
    pub fn apply_to(self, rule: &Rule) -> UnvalidatedRule {
        UnvalidatedRule {
            name: self.name.unwrap_or_else(|| rule.name.clone()),
            field: self.field.unwrap_or_else(|| rule.field.clone()),
            operator: self.operator.unwrap_or_else(|| rule.operator.clone()),
            value: self.value.unwrap_or_else(|| rule.value.clone()),
            category_id: self.category_id.unwrap_or(rule.category_id),
            priority: self.priority.unwrap_or(rule.priority),
            active: self.active.unwrap_or(rule.active),
        }
    }
}

/// A rule whose condition is known to parse, with canonical field and
/// operator spellings.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRule {
    pub name: String,
    pub field: RuleField,
    pub operator: RuleOperator,
    pub value: String,
    pub category_id: CategoryId,
    pub priority: i32,
    pub active: bool,
}

impl ValidatedRule {
    pub fn validate(rule: UnvalidatedRule) -> Result<ValidatedRule, CoreError> {
        let name = rule.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::Empty("Rule name"));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::TooLong {
                field: "Rule name",
                max: MAX_NAME_LEN,
            });
        }
        let value = rule.value.trim().to_string();
        if value.chars().count() > MAX_VALUE_LEN {
            return Err(CoreError::TooLong {
                field: "Rule value",
                max: MAX_VALUE_LEN,
            });
        }

        let condition = Condition::parse(&rule.field, &rule.operator, &value)?;
        // Both parsed above, so these cannot fail.
        let operator = RuleOperator::from_str(&rule.operator)?;

        Ok(ValidatedRule {
            name,
            field: condition.field(),
            operator,
            value,
            category_id: rule.category_id,
            priority: rule.priority,
            active: rule.active,
        })
    }
}
