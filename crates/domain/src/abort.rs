use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-session cooperative-cancellation flag (§3 Abort Flag, §5).
///
/// One `AbortToken` per session. Cloning is cheap (shared `Arc`); every
/// suspension point in the Turn Orchestrator and the remote-job poll loop
/// reads `is_aborted()` without taking a lock.
#[derive(Debug, Clone)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Process-wide map of session id -> abort token. A new turn on a session
/// clears any flag left over from a prior turn (spec.md §3: "cleared at
/// start of a new turn on that session").
#[derive(Debug, Default)]
pub struct AbortMap {
    tokens: RwLock<HashMap<String, AbortToken>>,
}

impl AbortMap {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new turn on `session_id`: returns a fresh, cleared token.
    pub fn begin_turn(&self, session_id: &str) -> AbortToken {
        let mut tokens = self.tokens.write();
        let token = tokens
            .entry(session_id.to_string())
            .or_insert_with(AbortToken::new)
            .clone();
        token.clear();
        token
    }

    /// Set the abort flag for a session. Idempotent; a no-op if the session
    /// has no in-flight turn (the flag is still recorded so a turn that
    /// starts immediately after observes it was requested).
    pub fn abort(&self, session_id: &str) {
        let mut tokens = self.tokens.write();
        tokens
            .entry(session_id.to_string())
            .or_insert_with(AbortToken::new)
            .abort();
    }

    pub fn is_aborted(&self, session_id: &str) -> bool {
        self.tokens
            .read()
            .get(session_id)
            .map(|t| t.is_aborted())
            .unwrap_or(false)
    }

    pub fn remove(&self, session_id: &str) {
        self.tokens.write().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_turn_clears_prior_abort() {
        let map = AbortMap::new();
        map.abort("s1");
        assert!(map.is_aborted("s1"));
        let token = map.begin_turn("s1");
        assert!(!token.is_aborted());
        assert!(!map.is_aborted("s1"));
    }

    #[test]
    fn abort_is_visible_without_locking_reads() {
        let map = AbortMap::new();
        let token = map.begin_turn("s1");
        assert!(!token.is_aborted());
        map.abort("s1");
        assert!(token.is_aborted());
    }

    #[test]
    fn abort_before_turn_start_is_recorded() {
        let map = AbortMap::new();
        map.abort("s2");
        assert!(map.is_aborted("s2"));
    }

    #[test]
    fn remove_forgets_the_session() {
        let map = AbortMap::new();
        map.begin_turn("s1");
        map.remove("s1");
        assert!(!map.is_aborted("s1"));
    }
}
