//! `GET /healthz`, grounded on `ProviderRegistry`'s own readiness
//! bookkeeping (`is_empty`/`init_errors`): a gateway with zero live
//! providers is up but not actually serviceable, so that distinction is
//! surfaced here rather than just returning a bare "ok".

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    let providers_ready = !state.llm.is_empty();
    let status = if providers_ready { "ok" } else { "degraded" };

    Json(serde_json::json!({
        "status": status,
        "providers_ready": providers_ready,
        "provider_count": state.llm.len(),
        "init_errors": state.llm.init_errors().iter().map(|e| serde_json::json!({
            "provider_id": e.provider_id,
            "kind": e.kind,
            "error": e.error,
        })).collect::<Vec<_>>(),
    }))
    .into_response()
}
