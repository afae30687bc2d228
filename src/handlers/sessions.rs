// Session control endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use super::ErrorResponse;
use crate::session::types::{SessionError, SessionState, SessionStats};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub state: SessionState,
    pub stats: SessionStats,
}

/// Start a new bounded session. Fails with 409 while one is running.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<StartSessionResponse>), (StatusCode, Json<ErrorResponse>)> {
    match state.sessions.start_session().await {
        Ok(session_id) => Ok((StatusCode::ACCEPTED, Json(StartSessionResponse { session_id }))),
        Err(SessionError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "a session is already running".to_string(),
            }),
        )),
        Err(e) => {
            error!(error = %e, "failed to start session");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            ))
        }
    }
}

/// Request the running session to stop and finalize.
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    match state.sessions.stop_session().await {
        Ok(()) => Ok(StatusCode::ACCEPTED),
        Err(_) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "no session is running".to_string(),
            }),
        )),
    }
}

/// State and stats of the current (or most recent) session.
pub async fn session_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionStatusResponse>, StatusCode> {
    state
        .sessions
        .current_session()
        .await
        .map(|(session_id, session_state, stats)| {
            Json(SessionStatusResponse {
                session_id,
                state: session_state,
                stats,
            })
        })
        .ok_or(StatusCode::NOT_FOUND)
}
