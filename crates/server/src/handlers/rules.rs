use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use categorizer_core::{
    Condition, Rule, RuleId, RuleUpdate, TransactionId, UnvalidatedRule, ValidatedRule,
};
use categorizer_import::{condition_matches, CategorizableTransaction};
use categorizer_storage::{self as storage, TransactionFilter};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

fn rule_not_found(id: i64) -> AppError {
    AppError::not_found(format!("Rule {id} not found"))
}

/// Rules in evaluation order.
pub async fn list_rules(State(state): State<AppState>) -> Result<Json<Vec<Rule>>, AppError> {
    Ok(Json(storage::get_all_rules(&state.db).await?))
}

pub async fn get_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Rule>, AppError> {
    storage::get_rule(&state.db, RuleId(id))
        .await?
        .map(Json)
        .ok_or_else(|| rule_not_found(id))
}

pub async fn create_rule(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UnvalidatedRule>,
) -> Result<(StatusCode, Json<Rule>), AppError> {
    let rule = ValidatedRule::validate(body)?;
    let rule = storage::insert_rule(&state.db, &rule).await?;
    tracing::info!(rule_id = rule.id.0, name = %rule.name, priority = rule.priority, "Rule created");
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<RuleUpdate>,
) -> Result<Json<Rule>, AppError> {
    let current = storage::get_rule(&state.db, RuleId(id))
        .await?
        .ok_or_else(|| rule_not_found(id))?;
    let rule = ValidatedRule::validate(body.apply_to(&current))?;
    let rule = storage::update_rule(&state.db, RuleId(id), &rule).await?;
    tracing::info!(rule_id = id, "Rule updated");
    Ok(Json(rule))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    storage::delete_rule(&state.db, RuleId(id)).await?;
    tracing::info!(rule_id = id, "Rule deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Rule>, AppError> {
    let rule = storage::toggle_rule(&state.db, RuleId(id)).await?;
    tracing::info!(rule_id = id, active = rule.active, "Rule toggled");
    Ok(Json(rule))
}

#[derive(Debug, Deserialize)]
pub struct RuleTestRequest {
    field: String,
    operator: String,
    value: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleTestResponse {
    match_count: usize,
    transaction_ids: Vec<TransactionId>,
}

/// Dry run of an unsaved condition over every stored transaction.
pub async fn test_rule(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RuleTestRequest>,
) -> Result<Json<RuleTestResponse>, AppError> {
    let condition = Condition::parse(&body.field, &body.operator, body.value.trim())?;
    let transactions = storage::list_transactions(&state.db, &TransactionFilter::default()).await?;

    let transaction_ids: Vec<TransactionId> = transactions
        .iter()
        .filter(|tx| condition_matches(&condition, &CategorizableTransaction::from(*tx)))
        .map(|tx| tx.id)
        .collect();

    Ok(Json(RuleTestResponse {
        match_count: transaction_ids.len(),
        transaction_ids,
    }))
}
