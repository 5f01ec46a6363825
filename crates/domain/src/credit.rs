use serde::{Deserialize, Serialize};

/// Outbound credit interface (§6), grounded on
/// `original_source/.../credit_service.py`.
#[derive(Debug, Clone, Serialize)]
pub struct CreditCheckRequest {
    pub token: String,
    /// Boolean preflight in practice (spec.md §4.1 step 6: "balance > 0",
    /// not quantitative); kept as an integer count to match the outbound
    /// wire shape of the original `check_credits(token, n)`.
    pub n: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreditCheckResponse {
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub balance: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditUpdateRequest {
    pub token: String,
    /// Signed delta; a turn that charges N issues exactly one request with
    /// `delta = -N`.
    pub delta: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreditUpdateResponse {
    pub ok: bool,
    pub message: String,
    #[serde(default)]
    pub balance: Option<i64>,
}

/// The `credit_info` block returned to the client alongside every turn
/// (§6 response shape).
#[derive(Debug, Clone, Serialize)]
pub struct CreditInfo {
    pub deducted: i64,
    pub success: bool,
    #[serde(default)]
    pub remaining: Option<i64>,
    pub local_mode: bool,
}

impl CreditInfo {
    pub fn local_mode_stub() -> Self {
        Self {
            deducted: 0,
            success: true,
            remaining: None,
            local_mode: true,
        }
    }
}
