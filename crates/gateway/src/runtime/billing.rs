//! Process-wide billing counter map (§3, §4.7), grounded on
//! `original_source/.../billing_tracker.py`'s per-session counter table.

use std::collections::HashMap;

use parking_lot::Mutex;
use rsa_domain::billing::BillingCounter;

#[derive(Default)]
pub struct BillingMap {
    counters: Mutex<HashMap<String, BillingCounter>>,
}

impl BillingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track_llm_call(&self, session_id: &str, label: &str) {
        self.counters
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .track_llm_call(label);
    }

    pub fn track_remote_job(&self, session_id: &str, label: &str) {
        self.counters
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .track_remote_job(label);
    }

    /// Remove and return the counter for settlement. Cleared whether or not
    /// settlement itself succeeds (§4.7: "exactly-once settlement").
    pub fn take(&self, session_id: &str) -> BillingCounter {
        self.counters.lock().remove(session_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_and_returns_the_counter() {
        let map = BillingMap::new();
        map.track_llm_call("s1", "classify");
        map.track_remote_job("s1", "submit");

        let counter = map.take("s1");
        assert_eq!(counter.llm_calls, 1);
        assert_eq!(counter.remote_jobs, 1);

        let cleared = map.take("s1");
        assert_eq!(cleared.llm_calls, 0);
    }

    #[test]
    fn sessions_are_independent() {
        let map = BillingMap::new();
        map.track_llm_call("s1", "a");
        map.track_llm_call("s2", "b");
        map.track_llm_call("s2", "c");

        assert_eq!(map.take("s1").llm_calls, 1);
        assert_eq!(map.take("s2").llm_calls, 2);
    }
}
