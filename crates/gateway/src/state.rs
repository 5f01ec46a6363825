//! Shared application state passed to all API handlers, grounded on the
//! teacher's `AppState` (one `Arc`-wrapped field per collaborator, grouped
//! by concern).

use std::sync::Arc;

use rsa_domain::abort::AbortMap;
use rsa_domain::config::Config;
use rsa_providers::{CreditClient, LlmProvider, ProviderRegistry, RagClient, RemoteJobClient};
use rsa_sessions::SessionStore;

use crate::runtime::billing::BillingMap;
use crate::runtime::progress::ProgressHub;
use crate::runtime::registry::AgentRegistry;

#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub llm: Arc<ProviderRegistry>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<SessionStore>,

    // ── Turn runtime ──────────────────────────────────────────────────
    pub billing: Arc<BillingMap>,
    pub abort_map: Arc<AbortMap>,
    pub progress: Arc<ProgressHub>,
    pub agents: Arc<AgentRegistry>,

    // ── Optional outbound collaborators ────────────────────────────────
    /// `None` in a deployment with no RAG backend configured: the
    /// Knowledge Pipeline falls straight to its general-knowledge branch.
    pub rag: Option<Arc<dyn RagClient>>,
    /// `None` in a deployment with no remote-job backend configured:
    /// task codes 2/3 fail with a handler error.
    pub remote_job: Option<Arc<dyn RemoteJobClient>>,
    /// `None` in local mode with no credit service wired: settlement is a
    /// no-op stub (§4.7).
    pub credit: Option<Arc<dyn CreditClient>>,
}

impl AppState {
    pub fn default_provider(&self) -> Option<Arc<dyn LlmProvider>> {
        self.llm.default_provider()
    }
}
