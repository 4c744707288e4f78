use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use categorizer_core::{
    CategoryId, CategorySource, NewTransaction, Transaction, TransactionId, TransactionUpdate,
};
use categorizer_import::{CategorizableTransaction, CategoryRuleEngine};
use categorizer_storage::{self as storage, DbPool, TransactionFilter};
use serde::{Deserialize, Serialize};

use super::optional_json;
use crate::error::{ApiJson, AppError};
use crate::state::AppState;

const MAX_PAGE_SIZE: i64 = 1000;

/// Builds an engine over the currently active rules.
pub(crate) async fn load_rule_engine(db: &DbPool) -> Result<CategoryRuleEngine, AppError> {
    Ok(CategoryRuleEngine::new(storage::get_active_rules(db).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    category_id: Option<i64>,
    #[serde(default)]
    uncategorized: bool,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Transaction>>, AppError> {
    if query.limit.is_some_and(|l| !(0..=MAX_PAGE_SIZE).contains(&l)) {
        return Err(AppError::bad_request(format!(
            "limit must be between 0 and {MAX_PAGE_SIZE}"
        )));
    }
    if query.offset.is_some_and(|o| o < 0) {
        return Err(AppError::bad_request("offset must not be negative"));
    }

    let filter = TransactionFilter {
        category_id: query.category_id.map(CategoryId),
        uncategorized: query.uncategorized,
        search: query.search,
        limit: query.limit,
        offset: query.offset,
    };
    Ok(Json(storage::list_transactions(&state.db, &filter).await?))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Transaction>, AppError> {
    storage::get_transaction(&state.db, TransactionId(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("Transaction {id} not found")))
}

/// Manual entry. Without an explicit category the active rules get a say.
pub async fn create_transaction(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewTransaction>,
) -> Result<(StatusCode, Json<Transaction>), AppError> {
    let mut tx = body.validate()?;

    if tx.category_id.is_none() {
        let engine = load_rule_engine(&state.db).await?;
        let candidate = CategorizableTransaction {
            description: &tx.description,
            merchant: tx.merchant.as_deref(),
            notes: tx.notes.as_deref(),
            amount: tx.amount,
        };
        if let Some(rule) = engine.find_matching_rule(&candidate) {
            tracing::debug!(rule_id = rule.id.0, "Rule matched new transaction");
            tx.category_id = Some(rule.category_id);
            tx.category_source = Some(CategorySource::Rule);
        }
    }

    let stored = storage::insert_transaction(&state.db, &tx).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<TransactionUpdate>,
) -> Result<Json<Transaction>, AppError> {
    let current = storage::get_transaction(&state.db, TransactionId(id))
        .await?
        .ok_or_else(|| AppError::not_found(format!("Transaction {id} not found")))?;
    let updated = body.apply_to(&current)?;
    Ok(Json(
        storage::update_transaction(&state.db, TransactionId(id), &updated).await?,
    ))
}

pub async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    storage::delete_transaction(&state.db, TransactionId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategorizeRequest {
    /// Also revisit transactions a rule categorized before.
    #[serde(default)]
    overwrite: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizeResponse {
    examined: usize,
    categorized: u64,
}

/// Re-runs the active rules. Manually categorized transactions are left alone.
/// The body is optional.
pub async fn categorize_transactions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CategorizeResponse>, AppError> {
    let request: CategorizeRequest = optional_json(&body)?;

    let engine = load_rule_engine(&state.db).await?;
    let candidates =
        storage::get_transactions_for_categorization(&state.db, request.overwrite).await?;

    let views: Vec<CategorizableTransaction<'_>> =
        candidates.iter().map(CategorizableTransaction::from).collect();
    let assignments: Vec<(TransactionId, CategoryId)> = engine
        .apply_rules(&views)
        .into_iter()
        .filter_map(|(idx, rule)| {
            let tx = &candidates[idx];
            (tx.category_id != Some(rule.category_id)).then_some((tx.id, rule.category_id))
        })
        .collect();

    let categorized = storage::assign_rule_categories(&state.db, &assignments).await?;
    tracing::info!(
        examined = candidates.len(),
        categorized,
        overwrite = request.overwrite,
        "Re-ran categorization rules"
    );

    Ok(Json(CategorizeResponse {
        examined: candidates.len(),
        categorized,
    }))
}
