use thiserror::Error;

/// Domain validation failures for categories, rules and transactions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{field} is too long (max {max} characters)")]
    TooLong { field: &'static str, max: usize },
    #[error("Invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),
    #[error("Unknown rule field: '{0}'")]
    UnknownField(String),
    #[error("Unknown rule operator: '{0}'")]
    UnknownOperator(String),
    #[error("Operator '{operator}' cannot be used with field '{field}'")]
    OperatorFieldMismatch { operator: String, field: String },
    #[error("Invalid regular expression: {0}")]
    InvalidPattern(String),
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
}
