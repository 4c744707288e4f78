use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use categorizer_core::{Category, CategoryId, NewCategory};
use categorizer_storage as storage;

use crate::error::{ApiJson, AppError};
use crate::state::AppState;

pub async fn list_categories(State(state): State<AppState>) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(storage::get_all_categories(&state.db).await?))
}

pub async fn create_category(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewCategory>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = storage::insert_category(&state.db, &body.validate()?).await?;
    tracing::info!(category_id = category.id.0, name = %category.name, "Category created");
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(body): ApiJson<NewCategory>,
) -> Result<Json<Category>, AppError> {
    let category = storage::update_category(&state.db, CategoryId(id), &body.validate()?).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    storage::delete_category(&state.db, CategoryId(id)).await?;
    tracing::info!(category_id = id, "Category deleted");
    Ok(StatusCode::NO_CONTENT)
}
