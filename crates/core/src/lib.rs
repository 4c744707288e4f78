pub mod category;
pub mod error;
pub mod money;
pub mod rule;
pub mod transaction;

pub use category::{Category, CategoryId, NewCategory, DEFAULT_CATEGORIES};
pub use error::CoreError;
pub use money::Money;
pub use rule::{
    Condition, Rule, RuleField, RuleId, RuleOperator, RuleUpdate, UnvalidatedRule, ValidatedRule,
};
pub use transaction::{
    CategorySource, NewTransaction, Transaction, TransactionId, TransactionUpdate,
};
