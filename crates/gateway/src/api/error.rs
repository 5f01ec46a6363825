//! HTTP error mapping (§7 Error Handling Design table), grounded on the
//! teacher's `api_error` helper (`{"error": "<message>"}` JSON body) but
//! extended to the turn pipeline's richer taxonomy: most collaborator
//! failures never reach here at all — `runtime::turn::run` absorbs them
//! into a 200 response carrying a negative task code, per §7's "no HTTP
//! error" column. Only the few variants that fail before a turn begins
//! (auth, credit preflight, request validation) surface as real HTTP
//! error statuses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rsa_domain::error::Error;

pub fn into_response(err: &Error) -> Response {
    let (status, message) = match err {
        Error::AuthMissing(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
        Error::InsufficientCredit => (StatusCode::PAYMENT_REQUIRED, "insufficient credit".to_string()),
        Error::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        Error::UserAbort
        | Error::UpstreamTimeout(_)
        | Error::UpstreamNetwork(_)
        | Error::UpstreamAuth(_)
        | Error::HandlerFailure(_) => {
            // These are carried in the 200 turn response body as a negative
            // task code (§7); a caller reaching this arm hit one outside
            // that flow (e.g. a standalone abort/status lookup), so report
            // it as a plain server error rather than inventing a status.
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        Error::PersistenceFailure(msg) => {
            tracing::warn!(error = %msg, "persistence failure reached the HTTP boundary");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
        }
        Error::Io(_) | Error::Json(_) | Error::Http(_) | Error::Config(_) | Error::Provider { .. } | Error::Other(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    };

    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        into_response(&self.0)
    }
}
