use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-session, in-memory billing counter (§3, §4.7).
///
/// `start_time` is recorded at first event so settlement can report a
/// duration, mirroring `billing_tracker.py`'s `calculate_cost`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingCounter {
    pub llm_calls: u32,
    pub remote_jobs: u32,
    pub start_time: DateTime<Utc>,
    pub details: Vec<BillingDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingDetail {
    /// "llm_call" or "remote_job".
    pub kind: String,
    /// Free-text label, e.g. "task_classification", "scenario_classification".
    pub label: String,
    pub at: DateTime<Utc>,
}

impl Default for BillingCounter {
    fn default() -> Self {
        Self {
            llm_calls: 0,
            remote_jobs: 0,
            start_time: Utc::now(),
            details: Vec::new(),
        }
    }
}

impl BillingCounter {
    pub fn track_llm_call(&mut self, label: impl Into<String>) {
        self.llm_calls += 1;
        self.details.push(BillingDetail {
            kind: "llm_call".to_string(),
            label: label.into(),
            at: Utc::now(),
        });
    }

    pub fn track_remote_job(&mut self, label: impl Into<String>) {
        self.remote_jobs += 1;
        self.details.push(BillingDetail {
            kind: "remote_job".to_string(),
            label: label.into(),
            at: Utc::now(),
        });
    }

    /// `cost = llm_calls * llm_factor + remote_jobs * job_factor`, floored
    /// to an integer before settlement (§4.7).
    pub fn cost(&self, llm_factor: f64, job_factor: f64) -> i64 {
        let raw = self.llm_calls as f64 * llm_factor + self.remote_jobs as f64 * job_factor;
        raw.floor() as i64
    }

    pub fn duration(&self) -> chrono::Duration {
        Utc::now() - self.start_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_is_floored() {
        let mut c = BillingCounter::default();
        c.track_llm_call("classify");
        c.track_llm_call("answer");
        c.track_remote_job("submit");
        // 2 * 1.0 + 1 * 1.0 = 3.0
        assert_eq!(c.cost(1.0, 1.0), 3);
        // fractional factors floor down
        assert_eq!(c.cost(0.4, 0.4), 1);
    }

    #[test]
    fn empty_counter_costs_nothing() {
        let c = BillingCounter::default();
        assert_eq!(c.cost(1.0, 1.0), 0);
    }

    #[test]
    fn details_accumulate_in_order() {
        let mut c = BillingCounter::default();
        c.track_llm_call("a");
        c.track_remote_job("b");
        c.track_llm_call("c");
        let kinds: Vec<&str> = c.details.iter().map(|d| d.kind.as_str()).collect();
        assert_eq!(kinds, vec!["llm_call", "remote_job", "llm_call"]);
    }
}
