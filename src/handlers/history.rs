// Pass-through endpoints over the local session history store

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::error;

use crate::db::HistoryItem;
use crate::state::AppState;

/// List all finalized sessions, newest first.
pub async fn list_history(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<HistoryItem>>, StatusCode> {
    state.history_db.list().map(Json).map_err(|e| {
        error!(error = %e, "failed to list history");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

/// Fetch one history item by id.
pub async fn get_history_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<HistoryItem>, StatusCode> {
    match state.history_db.get(id) {
        Ok(Some(item)) => Ok(Json(item)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, id, "failed to get history item");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Fetch only the result label of one history item.
pub async fn get_history_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<String>, StatusCode> {
    match state.history_db.get(id) {
        Ok(Some(item)) => Ok(Json(item.result)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!(error = %e, id, "failed to get history result");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Remove a history item.
pub async fn delete_history_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> StatusCode {
    match state.history_db.delete(id) {
        Ok(true) => StatusCode::NO_CONTENT,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!(error = %e, id, "failed to delete history item");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
