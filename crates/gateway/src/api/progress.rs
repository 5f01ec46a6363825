//! Progress subscription and abort endpoints (§4.2, §6), grounded on the
//! teacher's `run_events_sse` handler: subscribe, stream every event as an
//! SSE frame, rely on axum's keepalive for the ≥30s heartbeat floor (the
//! hub's own `heartbeat_sweep` backs this up for sessions with no fresh
//! real event).

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::Stream;
use rsa_domain::progress::ProgressEvent;

use crate::state::AppState;

/// `GET /progress/stream/:session_id` — a long-lived one-way stream of
/// `ProgressEvent` JSON frames (§6). Never terminates on its own; the
/// client disconnects, or the hub drops the buffered session once it has
/// no subscribers left.
pub async fn subscribe(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    let rx = state.progress.subscribe(&session_id);
    Sse::new(make_event_stream(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)))
        .into_response()
}

fn make_event_stream(
    mut rx: tokio::sync::mpsc::Receiver<ProgressEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let event_type = format!("{:?}", event.stage);
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(Event::default().event(event_type).data(data));
        }
    }
}

/// `POST /progress/abort/:session_id` — idempotent (§6): sets the abort
/// flag whether or not a turn is currently in flight on this session.
pub async fn abort(State(state): State<AppState>, Path(session_id): Path<String>) -> Response {
    state.abort_map.abort(&session_id);
    state.progress.abort(&session_id);
    Json(serde_json::json!({ "session_id": session_id, "aborted": true })).into_response()
}
