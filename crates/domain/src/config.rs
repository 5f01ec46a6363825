use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub deployment: DeploymentConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub remote_job: RemoteJobConfig,
    #[serde(default)]
    pub rag: RagConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
        }
    }
}

fn d_host() -> String {
    "0.0.0.0".to_string()
}
fn d_port() -> u16 {
    8080
}

/// Gates every mode-dependent branch in Auth (§4.8), Session Store (§4.6),
/// Billing (§4.7), and the remote-job environment check (§4.5.1 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Production,
    Local,
}

impl Default for DeploymentMode {
    fn default() -> Self {
        DeploymentMode::Local
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeploymentConfig {
    #[serde(default)]
    pub mode: DeploymentMode,
    /// Process-configured remote-job / credit token, used as the preferred
    /// token in local mode (§4.8).
    #[serde(default)]
    pub configured_token: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider system (trimmed from the teacher's richer multi-role config
// to the roles this system actually needs)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_timeout_ms")]
    pub default_timeout_ms: u64,
    /// If true, abort startup when no providers initialize.
    #[serde(default)]
    pub require_provider: bool,
    /// Registered LLM providers (data-driven: adding a provider = adding config).
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: d_timeout_ms(),
            require_provider: false,
            providers: Vec::new(),
        }
    }
}

fn d_timeout_ms() -> u64 {
    120_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key. The value
    /// itself never appears in config files or logs.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Sessions (§4.6, §5 resource bounds)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_max_messages")]
    pub max_messages: usize,
    #[serde(default = "d_max_context")]
    pub max_context: usize,
    #[serde(default = "d_max_age_days")]
    pub max_age_days: i64,
    #[serde(default = "d_max_total")]
    pub max_total: usize,
    #[serde(default)]
    pub local_cache_dir: Option<String>,
    #[serde(default = "d_true")]
    pub local_cache_enabled: bool,
    /// Base URL of the remote, authoritative session store (§4.6). `None`
    /// disables the remote half entirely — every deployment then runs on
    /// the local JSON cache alone.
    #[serde(default)]
    pub remote_base_url: Option<String>,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_messages: d_max_messages(),
            max_context: d_max_context(),
            max_age_days: d_max_age_days(),
            max_total: d_max_total(),
            local_cache_dir: None,
            local_cache_enabled: true,
            remote_base_url: None,
        }
    }
}

fn d_max_messages() -> usize {
    50
}
fn d_max_context() -> usize {
    30
}
fn d_max_age_days() -> i64 {
    30
}
fn d_max_total() -> usize {
    100
}
fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Billing (§4.7)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "d_factor")]
    pub llm_factor: f64,
    #[serde(default = "d_factor")]
    pub job_factor: f64,
    #[serde(default)]
    pub credit_base_url: Option<String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            llm_factor: d_factor(),
            job_factor: d_factor(),
            credit_base_url: None,
        }
    }
}

fn d_factor() -> f64 {
    1.0
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Progress channel (§4.2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "d_buffer_cap")]
    pub buffer_capacity: usize,
    #[serde(default = "d_replay")]
    pub replay_on_subscribe: usize,
    #[serde(default = "d_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: d_buffer_cap(),
            replay_on_subscribe: d_replay(),
            heartbeat_interval_secs: d_heartbeat_secs(),
        }
    }
}

fn d_buffer_cap() -> usize {
    100
}
fn d_replay() -> usize {
    10
}
fn d_heartbeat_secs() -> u64 {
    30
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote-job workflow (§4.5)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteJobConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "d_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "d_poll_budget")]
    pub poll_budget_secs: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_core_num")]
    pub default_core_num: u32,
}

impl Default for RemoteJobConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            poll_interval_secs: d_poll_interval(),
            poll_budget_secs: d_poll_budget(),
            max_retries: d_max_retries(),
            default_core_num: d_core_num(),
        }
    }
}

fn d_poll_interval() -> u64 {
    10
}
fn d_poll_budget() -> u64 {
    120
}
fn d_max_retries() -> u32 {
    2
}
fn d_core_num() -> u32 {
    1
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// RAG (out-of-scope collaborator — interface config only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "d_top_k")]
    pub default_top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_top_k: d_top_k(),
        }
    }
}

fn d_top_k() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let back: Config = toml::from_str(&s).expect("deserialize");
        assert_eq!(back.sessions.max_messages, 50);
        assert_eq!(back.billing.llm_factor, 1.0);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let partial = r#"
            [deployment]
            mode = "production"
        "#;
        let cfg: Config = toml::from_str(partial).expect("deserialize");
        assert_eq!(cfg.deployment.mode, DeploymentMode::Production);
        assert_eq!(cfg.sessions.max_total, 100);
        assert_eq!(cfg.remote_job.poll_budget_secs, 120);
    }
}
