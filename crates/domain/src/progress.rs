use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stage event in a session's progress stream (§3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: String,
    pub message: String,
    pub stage: ProgressStage,
    pub progress_percent: u8,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>, stage: ProgressStage) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            stage,
            progress_percent: stage.default_percent(),
            metadata: serde_json::Value::Null,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_percent(mut self, percent: u8) -> Self {
        self.progress_percent = percent.min(100);
        self
    }

    /// The synthetic event sent to every new subscriber immediately on
    /// connect (§4.2 `subscribe`).
    pub fn connected(session_id: impl Into<String>) -> Self {
        Self::new(session_id, "connected", ProgressStage::Init).with_percent(0)
    }

    /// Non-displayable keepalive, emitted when no real event has fired
    /// within `HEARTBEAT_INTERVAL`. Carries no state.
    pub fn heartbeat(session_id: impl Into<String>) -> Self {
        Self::new(session_id, "", ProgressStage::Heartbeat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Init,
    Analyzing,
    Processing,
    LlmCall,
    Completing,
    Completed,
    Aborted,
    Error,
    Heartbeat,
}

impl ProgressStage {
    fn default_percent(self) -> u8 {
        match self {
            ProgressStage::Init => 0,
            ProgressStage::Analyzing => 10,
            ProgressStage::Processing => 40,
            ProgressStage::LlmCall => 60,
            ProgressStage::Completing => 90,
            ProgressStage::Completed => 100,
            ProgressStage::Aborted | ProgressStage::Error => 100,
            ProgressStage::Heartbeat => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_event_carries_zero_progress() {
        let ev = ProgressEvent::connected("s1");
        assert_eq!(ev.progress_percent, 0);
        assert_eq!(ev.stage, ProgressStage::Init);
    }

    #[test]
    fn serializes_stage_lower_snake_case() {
        let ev = ProgressEvent::new("s1", "working", ProgressStage::LlmCall);
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["stage"], "llm_call");
    }
}
