/// Shared error type used across all rsa crates.
///
/// Variants map 1:1 onto the error taxonomy of the turn pipeline (see
/// `rsa_gateway::api::error` for the HTTP status mapping); a handful of
/// ambient variants (`Io`, `Json`, `Http`, `Config`) exist purely to let
/// `?` work across the crate boundary.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    /// Abort flag observed at a suspension point. Unwinds the turn to
    /// SETTLE with task code -100.
    #[error("aborted by user")]
    UserAbort,

    /// LLM or remote call exceeded its timeout. Task code -101.
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),

    /// Connection/transport failure talking to an upstream collaborator.
    /// Task code -102.
    #[error("upstream network error: {0}")]
    UpstreamNetwork(String),

    /// Credit or auth-related upstream failure. Task code -103.
    #[error("upstream auth/credit error: {0}")]
    UpstreamAuth(String),

    /// Production preflight credit check failed. HTTP 402, no work done.
    #[error("insufficient credit")]
    InsufficientCredit,

    /// Token resolution failed per the Auth rules. HTTP 401, no work done.
    #[error("auth: {0}")]
    AuthMissing(String),

    /// Invalid file type/size, or an unsupported instruction mode. HTTP 400.
    #[error("validation: {0}")]
    Validation(String),

    /// Exception inside a branch handler. HTTP 200, status "error".
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// Session write failed. Logged only, never surfaced to the caller.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
