//! Auth (§4.8), grounded on `original_source/.../auth_service.py`'s
//! mode-dependent token resolution. No cryptographic comparison is
//! required by spec.md — unlike the teacher's SHA-256 bearer-token
//! hashing (dropped along with `sha2`, see DESIGN.md), plain string
//! comparison is sufficient here: the token is forwarded to the credit
//! and remote-job services as a bearer credential, never compared
//! locally against a secret.

use rsa_domain::config::DeploymentMode;
use rsa_domain::error::{Error, Result};

const MIN_PRODUCTION_TOKEN_LEN: usize = 10;

/// Resolve the token to use for this turn's downstream calls.
///
/// Production: the request must carry a token of at least
/// `MIN_PRODUCTION_TOKEN_LEN` characters. Local: prefer the
/// process-configured token, falling back to the request token; reject
/// only if neither is present.
pub fn resolve_token(
    mode: DeploymentMode,
    configured_token: Option<&str>,
    request_token: Option<&str>,
) -> Result<String> {
    match mode {
        DeploymentMode::Production => {
            let token = request_token
                .ok_or_else(|| Error::AuthMissing("a request token is required in production mode".into()))?;
            if token.len() < MIN_PRODUCTION_TOKEN_LEN {
                return Err(Error::AuthMissing(format!(
                    "token shorter than {MIN_PRODUCTION_TOKEN_LEN} characters"
                )));
            }
            Ok(token.to_string())
        }
        DeploymentMode::Local => configured_token
            .or(request_token)
            .map(str::to_string)
            .ok_or_else(|| Error::AuthMissing("no process-configured or request token available".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_requires_sufficiently_long_request_token() {
        assert!(resolve_token(DeploymentMode::Production, None, None).is_err());
        assert!(resolve_token(DeploymentMode::Production, None, Some("short")).is_err());
        assert_eq!(
            resolve_token(DeploymentMode::Production, None, Some("a-long-enough-token")).unwrap(),
            "a-long-enough-token"
        );
    }

    #[test]
    fn production_ignores_configured_token() {
        // The configured token is a local-mode convenience only; production
        // always requires the caller to present their own.
        assert!(resolve_token(DeploymentMode::Production, Some("process-token-12345"), None).is_err());
    }

    #[test]
    fn local_prefers_configured_over_request_token() {
        let resolved = resolve_token(DeploymentMode::Local, Some("configured"), Some("requested")).unwrap();
        assert_eq!(resolved, "configured");
    }

    #[test]
    fn local_falls_back_to_request_token() {
        let resolved = resolve_token(DeploymentMode::Local, None, Some("requested")).unwrap();
        assert_eq!(resolved, "requested");
    }

    #[test]
    fn local_rejects_when_both_are_absent() {
        assert!(resolve_token(DeploymentMode::Local, None, None).is_err());
    }
}
