//! HTTP route handlers fronting the Turn Orchestrator (§6 External
//! Interfaces), grounded on the teacher's `api::router` split/merge shape.
//! Unlike the teacher, every route here is reached through the same
//! request-carried-token auth (`runtime::auth::resolve_token`) rather than
//! a gateway-wide bearer middleware — this spec's auth is per-turn, not
//! per-deployment.

pub mod chat;
pub mod error;
pub mod file_extract;
pub mod health;
pub mod progress;
pub mod sessions;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::health))
        .route("/agent/chat", post(chat::chat))
        .route("/agent/chat/upload", post(chat::chat_upload))
        .route("/progress/stream/:session_id", get(progress::subscribe))
        .route("/progress/abort/:session_id", post(progress::abort))
        .route("/sessions", get(sessions::list))
        .route("/sessions/:session_id", get(sessions::load))
        .route("/sessions/:session_id", delete(sessions::delete))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
