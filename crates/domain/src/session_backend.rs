//! Trait for the remote half of the dual-backend session store (§4.6).
//!
//! Lives in `rsa-domain` rather than `rsa-providers` so `rsa-sessions` can
//! depend on the abstraction without pulling in the provider crate's HTTP
//! client stack. `rsa-providers` supplies the concrete `reqwest`-backed
//! implementation.

use crate::chat_session::ChatSession;
use crate::error::Result;

/// The remote, authoritative half of the session store.
#[async_trait::async_trait]
pub trait RemoteSessionBackend: Send + Sync {
    async fn create(&self, session: &ChatSession) -> Result<()>;
    async fn update(&self, session: &ChatSession) -> Result<()>;
    async fn load(&self, session_id: &str) -> Result<Option<ChatSession>>;
    async fn delete(&self, session_id: &str) -> Result<()>;
    /// Ids of all sessions known to the remote store, for the union-list op.
    async fn list_ids(&self) -> Result<Vec<String>>;
}
