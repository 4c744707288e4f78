//! Import batch endpoints. A batch lives in memory from upload until it is
//! committed, discarded, or expires.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use categorizer_core::{CategorySource, NewTransaction, TransactionId};
use categorizer_import::{
    BatchState, CategorizableTransaction, ColumnMapping, Fingerprint, ImportBatch, ImportRow,
    RowError, ValidationReport,
};
use categorizer_storage as storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::MappedMutexGuard;
use uuid::Uuid;

use super::optional_json;
use super::transactions::load_rule_engine;
use crate::error::{ApiJson, AppError};
use crate::state::AppState;

const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    id: Uuid,
    file_name: String,
    state: BatchState,
    headers: Vec<String>,
    row_count: usize,
    preview: Vec<Vec<String>>,
    suggested_mapping: ColumnMapping,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    valid_count: usize,
    error_count: usize,
    duplicate_count: usize,
    errors: Vec<RowError>,
    preview: Vec<ImportRow>,
}

impl From<&ValidationReport> for ValidationSummary {
    fn from(report: &ValidationReport) -> Self {
        Self {
            valid_count: report.valid_count(),
            error_count: report.error_count(),
            duplicate_count: report.duplicate_count(),
            errors: report.errors.clone(),
            preview: report.valid.iter().take(PREVIEW_ROWS).cloned().collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    id: Uuid,
    file_name: String,
    state: BatchState,
    headers: Vec<String>,
    row_count: usize,
    mapping: Option<ColumnMapping>,
    validation: Option<ValidationSummary>,
    created_at: DateTime<Utc>,
}

impl From<&ImportBatch> for BatchSummary {
    fn from(batch: &ImportBatch) -> Self {
        Self {
            id: batch.id,
            file_name: batch.file_name.clone(),
            state: batch.state(),
            headers: batch.table.headers.clone(),
            row_count: batch.table.rows.len(),
            mapping: batch.mapping().cloned(),
            validation: batch.report().map(ValidationSummary::from),
            created_at: batch.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CommitRequest {
    apply_rules: bool,
    skip_duplicates: bool,
}

impl Default for CommitRequest {
    fn default() -> Self {
        Self {
            apply_rules: true,
            skip_duplicates: false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    imported: usize,
    skipped: usize,
    categorized: usize,
    transaction_ids: Vec<TransactionId>,
}

async fn find_batch(
    state: &AppState,
    id: Uuid,
) -> Result<MappedMutexGuard<'_, ImportBatch>, AppError> {
    state
        .imports
        .get(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("Import {id} not found")))
}

/// Accepts a multipart form with a `file` field holding the CSV.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let bytes = field.bytes().await?;
        file = Some((file_name, bytes));
    }

    let (file_name, bytes) = file.ok_or_else(|| AppError::bad_request("Missing file field"))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("Uploaded file is empty"));
    }

    let batch = ImportBatch::upload(&file_name, &bytes)?;
    let response = UploadResponse {
        id: batch.id,
        file_name: batch.file_name.clone(),
        state: batch.state(),
        headers: batch.table.headers.clone(),
        row_count: batch.table.rows.len(),
        preview: batch.table.preview(PREVIEW_ROWS).to_vec(),
        suggested_mapping: batch.suggested_mapping(),
    };
    tracing::info!(
        batch_id = %batch.id,
        file_name = %batch.file_name,
        rows = response.row_count,
        "Import uploaded"
    );

    state.imports.insert(batch).await;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchSummary>, AppError> {
    let batch = find_batch(&state, id).await?;
    Ok(Json(BatchSummary::from(&*batch)))
}

pub async fn discard_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .imports
        .remove(id)
        .await
        .ok_or_else(|| AppError::not_found(format!("Import {id} not found")))?;
    tracing::info!(batch_id = %id, "Import discarded");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_mapping(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(mapping): ApiJson<ColumnMapping>,
) -> Result<Json<BatchSummary>, AppError> {
    let mut batch = find_batch(&state, id).await?;
    batch.apply_mapping(mapping)?;
    tracing::info!(batch_id = %id, "Import mapping applied");
    Ok(Json(BatchSummary::from(&*batch)))
}

/// Classifies every row and flags likely duplicates of stored transactions.
pub async fn validate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ValidationSummary>, AppError> {
    let mut batch = find_batch(&state, id).await?;
    let report = batch.validate()?;

    // Batch state is untouched until the report is recorded.
    let existing: Vec<Fingerprint> = match report.date_range() {
        Some((start, end)) => storage::get_transactions_between(&state.db, start, end)
            .await?
            .iter()
            .map(Fingerprint::from)
            .collect(),
        None => Vec::new(),
    };
    let summary = ValidationSummary::from(batch.record_validation(report, &existing)?);
    tracing::info!(
        batch_id = %id,
        valid = summary.valid_count,
        errors = summary.error_count,
        duplicates = summary.duplicate_count,
        "Import validated"
    );
    Ok(Json(summary))
}

/// Inserts the valid rows in one database transaction. The body is optional.
pub async fn commit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<CommitResponse>, AppError> {
    let request: CommitRequest = optional_json(&body)?;
    let mut batch = find_batch(&state, id).await?;

    let engine = if request.apply_rules {
        Some(load_rule_engine(&state.db).await?)
    } else {
        None
    };

    let (transactions, skipped) = {
        let rows = batch.rows_to_commit(request.skip_duplicates)?;
        let report = batch
            .report()
            .ok_or_else(|| AppError::internal("Validation report missing at commit"))?;
        let skipped = report.error_count() + (report.valid_count() - rows.len());

        let mut transactions: Vec<NewTransaction> =
            rows.iter().map(|row| row.to_new_transaction()).collect();
        if let Some(engine) = &engine {
            let views: Vec<CategorizableTransaction<'_>> = rows
                .iter()
                .map(|row| CategorizableTransaction::from(*row))
                .collect();
            for (idx, rule) in engine.apply_rules(&views) {
                transactions[idx].category_id = Some(rule.category_id);
                transactions[idx].category_source = Some(CategorySource::Rule);
            }
        }
        (transactions, skipped)
    };
    let categorized = transactions.iter().filter(|t| t.category_id.is_some()).count();

    let transaction_ids = storage::insert_transactions(&state.db, &transactions).await?;
    batch.mark_committed()?;

    tracing::info!(
        batch_id = %id,
        imported = transaction_ids.len(),
        skipped,
        categorized,
        "Import committed"
    );

    Ok(Json(CommitResponse {
        imported: transaction_ids.len(),
        skipped,
        categorized,
        transaction_ids,
    }))
}
