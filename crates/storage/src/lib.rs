pub mod categories;
pub mod db;
pub mod rules;
pub mod transactions;

pub use categories::{
    delete_category, get_all_categories, get_category, insert_category, update_category,
};
pub use db::{create_db, create_memory_db, seed_default_categories, DbPool, StorageError};
pub use rules::{
    delete_rule, get_active_rules, get_all_rules, get_rule, insert_rule, toggle_rule, update_rule,
};
pub use transactions::{
    assign_rule_categories, delete_transaction, get_transaction, get_transactions_between,
    get_transactions_for_categorization, insert_transaction, insert_transactions,
    list_transactions, update_transaction, TransactionFilter,
};
