use categorizer_core::{CategoryId, Condition, Money, Rule, RuleField, RuleOperator, Transaction};

use crate::validate::ImportRow;

/// The attributes of a transaction that rules can look at.
#[derive(Debug, Clone, Copy)]
pub struct CategorizableTransaction<'a> {
    pub description: &'a str,
    pub merchant: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub amount: Money,
}

impl<'a> From<&'a Transaction> for CategorizableTransaction<'a> {
    fn from(tx: &'a Transaction) -> Self {
        CategorizableTransaction {
            description: &tx.description,
            merchant: tx.merchant.as_deref(),
            notes: tx.notes.as_deref(),
            amount: tx.amount,
        }
    }
}

impl<'a> From<&'a ImportRow> for CategorizableTransaction<'a> {
    fn from(row: &'a ImportRow) -> Self {
        CategorizableTransaction {
            description: &row.description,
            merchant: row.merchant.as_deref(),
            notes: row.notes.as_deref(),
            amount: row.amount,
        }
    }
}

/// Internal pairing of a rule with its parsed condition.
struct CompiledRule {
    rule: Rule,
    condition: Condition,
}

/// Evaluates active rules against transactions. The first rule in evaluation
/// order whose condition holds decides the category.
pub struct CategoryRuleEngine {
    rules: Vec<CompiledRule>,
}

impl CategoryRuleEngine {
    /// Inactive rules are dropped. Rules whose field, operator or value cannot
    /// be parsed are skipped with a warning; they never fail the engine.
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .filter(|rule| rule.active)
            .filter_map(|rule| match rule.condition() {
                Ok(condition) => Some(CompiledRule { rule, condition }),
                Err(e) => {
                    tracing::warn!(rule_id = rule.id.0, error = %e, "Skipping unusable categorization rule");
                    None
                }
            })
            .collect();
        // Highest priority first; the older rule wins a tie.
        compiled.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then(a.rule.id.cmp(&b.rule.id))
        });
        Self { rules: compiled }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find_matching_rule(&self, tx: &CategorizableTransaction<'_>) -> Option<&Rule> {
        self.rules
            .iter()
            .find(|cr| condition_matches(&cr.condition, tx))
            .map(|cr| &cr.rule)
    }

    pub fn categorize(&self, tx: &CategorizableTransaction<'_>) -> Option<CategoryId> {
        self.find_matching_rule(tx).map(|rule| rule.category_id)
    }

    /// Returns indices + matched rules for all transactions, in order.
    pub fn apply_rules<'a>(
        &'a self,
        transactions: &[CategorizableTransaction<'_>],
    ) -> Vec<(usize, &'a Rule)> {
        transactions
            .iter()
            .enumerate()
            .filter_map(|(idx, tx)| self.find_matching_rule(tx).map(|r| (idx, r)))
            .collect()
    }
}

pub fn condition_matches(condition: &Condition, tx: &CategorizableTransaction<'_>) -> bool {
    match condition {
        Condition::Text {
            field,
            operator,
            needle,
        } => field_text(*field, tx).is_some_and(|text| text_matches(*operator, &text, needle)),
        Condition::Pattern { field, regex } => {
            field_text(*field, tx).is_some_and(|text| regex.is_match(&text))
        }
        Condition::Amount {
            operator,
            threshold,
        } => {
            let amount = tx.amount.as_decimal();
            match operator {
                RuleOperator::GreaterThan => amount > *threshold,
                RuleOperator::LessThan => amount < *threshold,
                _ => amount == *threshold,
            }
        }
    }
}

/// A missing optional field yields `None`, which no condition matches.
fn field_text(field: RuleField, tx: &CategorizableTransaction<'_>) -> Option<String> {
    match field {
        RuleField::Description => Some(tx.description.to_string()),
        RuleField::Merchant => tx.merchant.map(str::to_string),
        RuleField::Notes => tx.notes.map(str::to_string),
        RuleField::Amount => Some(tx.amount.to_string()),
    }
}

fn text_matches(operator: RuleOperator, text: &str, needle: &str) -> bool {
    let text = text.to_lowercase();
    match operator {
        RuleOperator::Contains => text.contains(needle),
        RuleOperator::StartsWith => text.trim_start().starts_with(needle),
        RuleOperator::EndsWith => text.trim_end().ends_with(needle),
        RuleOperator::Equals => text.trim() == needle,
        // Parsed into other condition kinds.
        RuleOperator::Regex | RuleOperator::GreaterThan | RuleOperator::LessThan => false,
    }
}
