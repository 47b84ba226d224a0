use axum::{extract::State, Json};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Every recorded change, oldest day first.
#[utoipa::path(
    get,
    path = "/history",
    tag = "history",
    security(("user_email" = [])),
    responses(
        (status = 200, description = "All history entries", body = Vec<serde_json::Value>),
        (status = 500, description = "Data directory unreadable", body = super::ErrorBody)
    )
)]
pub async fn get_history(State(state): State<AppState>) -> ApiResult<Json<Vec<Value>>> {
    state.store.read_all().await.map(Json).map_err(|e| {
        log::error!("Error reading history files: {}", e);
        ApiError::Internal("Failed to read history files".into())
    })
}
