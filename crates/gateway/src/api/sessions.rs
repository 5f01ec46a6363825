//! Session management endpoints, grounded on the teacher's
//! `resolve_session`/session-lookup handlers in `api/sessions.rs`: thin
//! wrappers over `SessionStore` returning its `ChatSession` JSON directly.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

use super::error::ApiError;

/// `GET /sessions` — every session id this gateway currently knows about
/// (union of local cache and remote store, §4.6).
pub async fn list(State(state): State<AppState>) -> Response {
    match state.sessions.list_ids().await {
        Ok(ids) => Json(serde_json::json!({ "session_ids": ids })).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `GET /sessions/:session_id`.
pub async fn load(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.sessions.load(&session_id).await {
        Ok(Some(session)) => Json(session).into_response(),
        Ok(None) => ApiError::from(rsa_domain::error::Error::Validation(format!("no such session: {session_id}")))
            .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// `DELETE /sessions/:session_id`.
pub async fn delete(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    match state.sessions.delete(&session_id).await {
        Ok(()) => Json(serde_json::json!({ "session_id": session_id, "deleted": true })).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
