//! Provider registry.
//!
//! Constructs and holds all configured LLM provider instances. At startup the
//! registry reads the [`LlmConfig`], resolves authentication (env vars), and
//! instantiates the appropriate adapter for each configured provider.

use crate::anthropic::AnthropicProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::LlmProvider;
use rsa_domain::config::LlmConfig;
use rsa_domain::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProviderRegistry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Holds all instantiated LLM providers.
///
/// Providers that fail to initialize are recorded rather than aborting
/// startup, so they can be surfaced on a readiness endpoint.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
    /// Provider IDs that failed to initialize, with their error messages.
    init_errors: Vec<ProviderInitError>,
}

/// Records a provider that failed to initialize.
#[derive(Debug, Clone)]
pub struct ProviderInitError {
    pub provider_id: String,
    pub kind: String,
    /// Error message with any potential secrets masked.
    pub error: String,
}

/// Mask substrings that look like API keys or bearer tokens in an error
/// message, so raw secrets never leak into logs or readiness endpoints.
fn mask_secrets(msg: &str) -> String {
    let mut result = msg.to_string();
    for word in msg.split(|c: char| c.is_whitespace() || c == '\'' || c == '"' || c == ',') {
        let trimmed = word.trim();
        if trimmed.len() >= 20
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            let masked = if trimmed.len() > 8 {
                format!("{}...{}", &trimmed[..4], &trimmed[trimmed.len() - 4..])
            } else {
                "***masked***".to_string()
            };
            result = result.replace(trimmed, &masked);
        }
    }
    result
}

impl ProviderRegistry {
    /// Build the registry from the application's [`LlmConfig`].
    ///
    /// Each entry in `config.providers` is instantiated using the adapter
    /// matching its `kind` string (`"anthropic"` or `"openai_compat"`).
    /// Auth keys are resolved eagerly (env vars are read at this point).
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();
        let mut init_errors: Vec<ProviderInitError> = Vec::new();

        for pc in &config.providers {
            let result: Result<Arc<dyn LlmProvider>> = match pc.kind.as_str() {
                "anthropic" => {
                    AnthropicProvider::from_config(pc).map(|p| Arc::new(p) as Arc<dyn LlmProvider>)
                }
                "openai_compat" => OpenAiCompatProvider::from_config(pc)
                    .map(|p| Arc::new(p) as Arc<dyn LlmProvider>),
                other => Err(Error::Config(format!(
                    "provider '{}' has unknown kind '{other}'",
                    pc.id
                ))),
            };

            match result {
                Ok(provider) => {
                    tracing::info!(provider_id = %pc.id, kind = %pc.kind, "registered LLM provider");
                    providers.insert(pc.id.clone(), provider);
                }
                Err(e) => {
                    let safe_error = mask_secrets(&e.to_string());
                    tracing::warn!(
                        provider_id = %pc.id,
                        kind = %pc.kind,
                        error = %safe_error,
                        "failed to initialize LLM provider, skipping"
                    );
                    init_errors.push(ProviderInitError {
                        provider_id: pc.id.clone(),
                        kind: pc.kind.clone(),
                        error: safe_error,
                    });
                }
            }
        }

        if providers.is_empty() && !config.providers.is_empty() && config.require_provider {
            return Err(Error::Config(
                "all configured LLM providers failed to initialize (require_provider = true)"
                    .into(),
            ));
        }
        if providers.is_empty() && !config.providers.is_empty() {
            tracing::warn!(
                failed_providers = init_errors.len(),
                "no LLM providers initialized; gateway will boot but chat turns will fail \
                 until provider auth is configured"
            );
        }

        Ok(Self {
            providers,
            init_errors,
        })
    }

    /// Look up a provider by its config id.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(provider_id).cloned()
    }

    /// The first registered provider, used when the caller has no specific
    /// provider preference (the common case for this gateway's single-call
    /// turn orchestration).
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        let mut ids: Vec<&String> = self.providers.keys().collect();
        ids.sort();
        ids.first().and_then(|id| self.providers.get(*id)).cloned()
    }

    /// Iterate over all registered providers.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn LlmProvider>)> {
        self.providers.iter()
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// List all registered provider IDs (sorted).
    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Provider initialization errors (empty if all succeeded).
    pub fn init_errors(&self) -> &[ProviderInitError] {
        &self.init_errors
    }
}
