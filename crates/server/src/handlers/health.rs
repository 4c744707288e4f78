use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    message: &'static str,
    database: &'static str,
    timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            "unavailable"
        }
    };

    Json(HealthResponse {
        status: "ok",
        message: "Finance categorizer API is running",
        database,
        timestamp: Utc::now().to_rfc3339(),
    })
}
