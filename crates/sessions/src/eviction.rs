//! Local-cache eviction: `MAX_AGE_DAYS` and `MAX_TOTAL` caps apply to the
//! local cache only, enforced opportunistically at write time (§4.6).
//!
//! Grounded on the teacher's `lifecycle.rs` reset-boundary test style; the
//! semantics are new — this is a capacity/age sweep over the local cache,
//! not a daily-reset policy.

use chrono::{DateTime, Utc};
use rsa_domain::chat_session::ChatSession;

use crate::store::SessionStore;

/// Evaluate the local cache against the configured caps and evict whatever
/// is over them. Returns the number of sessions evicted.
pub fn sweep(store: &SessionStore, max_age_days: u32, max_total: usize, now: DateTime<Utc>) -> usize {
    let mut sessions = store.cached_sessions();
    let mut evicted = 0;

    // Age cap first: anything older than max_age_days goes regardless of count.
    let stale_ids: Vec<String> = sessions
        .iter()
        .filter(|s| is_stale(s, max_age_days, now))
        .map(|s| s.session_id.clone())
        .collect();
    for id in &stale_ids {
        store.evict_local(id);
        evicted += 1;
    }
    sessions.retain(|s| !stale_ids.contains(&s.session_id));

    // Total cap: evict oldest-updated first until under the limit.
    if sessions.len() > max_total {
        sessions.sort_by_key(|s| s.updated_at);
        let overflow = sessions.len() - max_total;
        for session in sessions.iter().take(overflow) {
            store.evict_local(&session.session_id);
            evicted += 1;
        }
    }

    evicted
}

fn is_stale(session: &ChatSession, max_age_days: u32, now: DateTime<Utc>) -> bool {
    let age = now.signed_duration_since(session.updated_at);
    age.num_days() >= max_age_days as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa_domain::config::DeploymentMode;

    fn session_at(id: &str, updated_at: DateTime<Utc>) -> ChatSession {
        let mut s = ChatSession::new(id, "t");
        s.updated_at = updated_at;
        s
    }

    async fn store_with(sessions: Vec<ChatSession>, dir: &std::path::Path) -> SessionStore {
        let store = SessionStore::new(DeploymentMode::Local, Some(dir.to_path_buf()), None).unwrap();
        for s in sessions {
            store.create(&s).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn evicts_sessions_older_than_max_age() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let sessions = vec![
            session_at("old", now - chrono::Duration::days(40)),
            session_at("fresh", now - chrono::Duration::days(1)),
        ];
        let store = store_with(sessions, dir.path()).await;
        let evicted = sweep(&store, 30, 100, now);
        assert_eq!(evicted, 1);
        assert!(store.load("old").await.unwrap().is_none());
        assert!(store.load("fresh").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn evicts_oldest_first_when_over_total_cap() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let sessions = vec![
            session_at("a", now - chrono::Duration::hours(3)),
            session_at("b", now - chrono::Duration::hours(2)),
            session_at("c", now - chrono::Duration::hours(1)),
        ];
        let store = store_with(sessions, dir.path()).await;
        let evicted = sweep(&store, 30, 2, now);
        assert_eq!(evicted, 1);
        assert!(store.load("a").await.unwrap().is_none());
        assert!(store.load("b").await.unwrap().is_some());
        assert!(store.load("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn no_eviction_under_caps() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let sessions = vec![session_at("a", now)];
        let store = store_with(sessions, dir.path()).await;
        assert_eq!(sweep(&store, 30, 100, now), 0);
    }
}
