//! Shared utility functions for provider adapters.

use rsa_domain::config::ProviderConfig;
use rsa_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::UpstreamTimeout(e.to_string())
    } else {
        Error::UpstreamNetwork(e.to_string())
    }
}

/// Resolve the API key for a configured provider: reads the environment
/// variable named by `api_key_env`. Providers intended for local-only use
/// (no remote endpoint, e.g. a test fake) may omit `api_key_env` entirely.
pub fn resolve_api_key(cfg: &ProviderConfig) -> Result<String> {
    let env_var = cfg.api_key_env.as_deref().ok_or_else(|| {
        Error::Config(format!("provider '{}' has no api_key_env configured", cfg.id))
    })?;
    std::env::var(env_var)
        .map_err(|_| Error::Config(format!("environment variable '{env_var}' not set or not valid UTF-8")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_api_key_reads_env_var() {
        let var_name = "RSA_TEST_RESOLVE_ENV_KEY_1234";
        std::env::set_var(var_name, "secret-value");
        let cfg = ProviderConfig {
            id: "p1".into(),
            kind: "openai_compat".into(),
            base_url: None,
            api_key_env: Some(var_name.into()),
            default_model: None,
        };
        assert_eq!(resolve_api_key(&cfg).unwrap(), "secret-value");
        std::env::remove_var(var_name);
    }

    #[test]
    fn resolve_api_key_missing_env_fails() {
        let cfg = ProviderConfig {
            id: "p1".into(),
            kind: "openai_compat".into(),
            base_url: None,
            api_key_env: Some("RSA_TEST_NONEXISTENT_VAR_8888".into()),
            default_model: None,
        };
        assert!(resolve_api_key(&cfg).is_err());
    }

    #[test]
    fn resolve_api_key_unconfigured_fails() {
        let cfg = ProviderConfig {
            id: "p1".into(),
            kind: "openai_compat".into(),
            base_url: None,
            api_key_env: None,
            default_model: None,
        };
        assert!(resolve_api_key(&cfg).is_err());
    }
}
