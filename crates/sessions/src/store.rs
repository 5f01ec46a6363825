//! Dual-backend session store (§4.6): local JSON cache + remote authoritative
//! store, reconciled per the mode-gated table in spec.md §4.6.
//!
//! Grounded on the teacher's `SessionStore` (gateway-owned JSON-file store
//! with an in-memory `RwLock` index) — the local-cache half keeps that
//! shape; the remote half and its production/local precedence rules are new.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rsa_domain::chat_session::ChatSession;
use rsa_domain::config::DeploymentMode;
use rsa_domain::error::{Error, Result};
use rsa_domain::session_backend::RemoteSessionBackend;
use rsa_domain::trace::TraceEvent;

/// Gateway-owned session store. Local cache is always consulted; the remote
/// backend is optional (absent in a pure-local deployment with no remote
/// store configured).
pub struct SessionStore {
    mode: DeploymentMode,
    cache_dir: Option<PathBuf>,
    cache: RwLock<HashMap<String, ChatSession>>,
    remote: Option<Arc<dyn RemoteSessionBackend>>,
}

impl SessionStore {
    /// Build a store. `cache_dir` is `None` when the local cache is disabled
    /// (`SessionsConfig::local_cache_enabled = false`).
    pub fn new(
        mode: DeploymentMode,
        cache_dir: Option<PathBuf>,
        remote: Option<Arc<dyn RemoteSessionBackend>>,
    ) -> Result<Self> {
        let mut cache = HashMap::new();
        if let Some(dir) = &cache_dir {
            std::fs::create_dir_all(dir).map_err(Error::Io)?;
            for entry in std::fs::read_dir(dir).map_err(Error::Io)? {
                let entry = entry.map_err(Error::Io)?;
                if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let raw = std::fs::read_to_string(entry.path()).map_err(Error::Io)?;
                if let Ok(session) = serde_json::from_str::<ChatSession>(&raw) {
                    cache.insert(session.session_id.clone(), session);
                }
            }
        }

        tracing::info!(cached_sessions = cache.len(), mode = ?mode, "session store loaded");

        Ok(Self {
            mode,
            cache_dir,
            cache: RwLock::new(cache),
            remote,
        })
    }

    fn cache_path(&self, session_id: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|d| d.join(format!("{session_id}.json")))
    }

    fn write_local(&self, session: &ChatSession) {
        self.cache.write().insert(session.session_id.clone(), session.clone());
        if let Some(path) = self.cache_path(&session.session_id) {
            if let Ok(json) = serde_json::to_string_pretty(session) {
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(session_id = %session.session_id, error = %e, "local session cache write failed");
                }
            }
        }
    }

    fn read_local(&self, session_id: &str) -> Option<ChatSession> {
        self.cache.read().get(session_id).cloned()
    }

    /// Create a new session. Production: write remote, mirror to cache
    /// best-effort. Local: write cache first, remote mirror best-effort;
    /// success if either succeeds.
    pub async fn create(&self, session: &ChatSession) -> Result<()> {
        match self.mode {
            DeploymentMode::Production => {
                let remote = self
                    .remote
                    .as_ref()
                    .ok_or_else(|| Error::PersistenceFailure("no remote session backend configured".into()))?;
                remote.create(session).await?;
                self.write_local(session);
                Ok(())
            }
            DeploymentMode::Local => {
                self.write_local(session);
                if let Some(remote) = &self.remote {
                    if let Err(e) = remote.create(session).await {
                        tracing::debug!(session_id = %session.session_id, error = %e, "remote session mirror failed (local mode, non-fatal)");
                    }
                }
                Ok(())
            }
        }
    }

    /// Update an existing session. Same precedence as [`Self::create`].
    pub async fn update(&self, session: &ChatSession) -> Result<()> {
        match self.mode {
            DeploymentMode::Production => {
                let remote = self
                    .remote
                    .as_ref()
                    .ok_or_else(|| Error::PersistenceFailure("no remote session backend configured".into()))?;
                remote.update(session).await?;
                self.write_local(session);
                Ok(())
            }
            DeploymentMode::Local => {
                self.write_local(session);
                if let Some(remote) = &self.remote {
                    if let Err(e) = remote.update(session).await {
                        tracing::debug!(session_id = %session.session_id, error = %e, "remote session mirror failed (local mode, non-fatal)");
                    }
                }
                Ok(())
            }
        }
    }

    /// Load a session. Production tries remote first (never returns stale
    /// data when remote is reachable), falling back to local cache on miss.
    /// Local tries cache first, falling back to remote and mirroring on hit.
    pub async fn load(&self, session_id: &str) -> Result<Option<ChatSession>> {
        match self.mode {
            DeploymentMode::Production => {
                if let Some(remote) = &self.remote {
                    match remote.load(session_id).await {
                        Ok(Some(session)) => {
                            self.write_local(&session);
                            return Ok(Some(session));
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(session_id, error = %e, "remote session load failed, falling back to stale local cache");
                        }
                    }
                }
                Ok(self.read_local(session_id))
            }
            DeploymentMode::Local => {
                if let Some(session) = self.read_local(session_id) {
                    return Ok(Some(session));
                }
                if let Some(remote) = &self.remote {
                    if let Some(session) = remote.load(session_id).await? {
                        self.write_local(&session);
                        return Ok(Some(session));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Delete a session remotely (no local-only state per §4.6).
    pub async fn delete(&self, session_id: &str) -> Result<()> {
        if let Some(remote) = &self.remote {
            remote.delete(session_id).await?;
        }
        self.cache.write().remove(session_id);
        if let Some(path) = self.cache_path(session_id) {
            let _ = std::fs::remove_file(path);
        }
        Ok(())
    }

    /// Union of local and remote session ids.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let mut ids: std::collections::HashSet<String> = self.cache.read().keys().cloned().collect();
        if let Some(remote) = &self.remote {
            for id in remote.list_ids().await? {
                ids.insert(id);
            }
        }
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        Ok(ids)
    }

    /// Resolve the session for a turn: load by id if supplied, else adopt the
    /// most recently updated session, else start a new one (§4.1 LOAD_HISTORY).
    pub async fn resolve_or_create(&self, session_id: Option<&str>) -> Result<(ChatSession, bool)> {
        if let Some(id) = session_id {
            if let Some(session) = self.load(id).await? {
                TraceEvent::SessionResolved {
                    session_id: session.session_id.clone(),
                    is_new: false,
                }
                .emit();
                return Ok((session, false));
            }
        }

        let most_recent = self
            .cache
            .read()
            .values()
            .max_by_key(|s| s.updated_at)
            .cloned();
        if let Some(session) = most_recent {
            TraceEvent::SessionResolved {
                session_id: session.session_id.clone(),
                is_new: false,
            }
            .emit();
            return Ok((session, false));
        }

        let session = ChatSession::new(ChatSession::mint_session_id(), "");
        TraceEvent::SessionResolved {
            session_id: session.session_id.clone(),
            is_new: true,
        }
        .emit();
        Ok((session, true))
    }

    /// Every session currently in the local cache — used by eviction.
    pub fn cached_sessions(&self) -> Vec<ChatSession> {
        self.cache.read().values().cloned().collect()
    }

    /// Evict a session from the local cache only (remote untouched).
    pub fn evict_local(&self, session_id: &str) {
        self.cache.write().remove(session_id);
        if let Some(path) = self.cache_path(session_id) {
            let _ = std::fs::remove_file(path);
        }
    }
}
