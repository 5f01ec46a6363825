use serde::Serialize;

/// Structured trace events emitted across all rsa crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    LlmRequest {
        provider: String,
        model: String,
        role: String,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        to_provider: String,
        reason: String,
    },
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    TurnStarted {
        session_id: String,
    },
    TurnBranch {
        session_id: String,
        task_code: i32,
    },
    TurnAborted {
        session_id: String,
    },
    TurnSettled {
        session_id: String,
        llm_calls: u32,
        remote_jobs: u32,
        deducted: i64,
        production_mode: bool,
    },
    ProgressSubscribed {
        session_id: String,
        replayed: usize,
    },
    RemoteJobSubmitted {
        project_name: String,
        task_name: String,
        attempt: u32,
    },
    RemoteJobRetried {
        project_name: String,
        attempt: u32,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "rsa_event");
    }
}
