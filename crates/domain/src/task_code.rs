use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The classifier's decision, or a terminal error condition. Crosses the
/// HTTP wire as a bare integer — client code branches on these values, so
/// the discriminants below must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum TaskCode {
    /// API auth or credit problem surfaced by an upstream collaborator.
    UpstreamAuth = -103,
    /// Connection/transport failure talking to an upstream collaborator.
    UpstreamNetwork = -102,
    /// An LLM or remote call timed out.
    UpstreamTimeout = -101,
    /// The user aborted the turn in flight.
    UserAbort = -100,
    /// Classifier inconclusive; routed to the general-answer fallback.
    GeneralAnswer = -1,
    /// Classification-only mode. Internal to the classifier; never
    /// returned to a client (the classifier itself only ever emits
    /// 1/2/3/-1).
    Classify = 0,
    /// Knowledge Pipeline.
    Knowledge = 1,
    /// Remote-Job submission.
    SubmitJob = 2,
    /// Remote-Job result retrieval.
    FetchJobResult = 3,
}

impl TaskCode {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            -103 => Self::UpstreamAuth,
            -102 => Self::UpstreamNetwork,
            -101 => Self::UpstreamTimeout,
            -100 => Self::UserAbort,
            -1 => Self::GeneralAnswer,
            0 => Self::Classify,
            1 => Self::Knowledge,
            2 => Self::SubmitJob,
            3 => Self::FetchJobResult,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Task codes the classifier is allowed to return (spec.md §4.3 step 3b).
    pub const CLASSIFIER_ALLOWED: [TaskCode; 4] =
        [TaskCode::Knowledge, TaskCode::SubmitJob, TaskCode::FetchJobResult, TaskCode::GeneralAnswer];

    pub fn is_terminal_error(self) -> bool {
        matches!(
            self,
            Self::UpstreamAuth | Self::UpstreamNetwork | Self::UpstreamTimeout | Self::UserAbort
        )
    }
}

impl Serialize for TaskCode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i32(self.as_i32())
    }
}

impl<'de> Deserialize<'de> for TaskCode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let v = i32::deserialize(d)?;
        TaskCode::from_i32(v).ok_or_else(|| serde::de::Error::custom(format!("unknown task code {v}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_spec() {
        assert_eq!(TaskCode::UpstreamAuth.as_i32(), -103);
        assert_eq!(TaskCode::UpstreamNetwork.as_i32(), -102);
        assert_eq!(TaskCode::UpstreamTimeout.as_i32(), -101);
        assert_eq!(TaskCode::UserAbort.as_i32(), -100);
        assert_eq!(TaskCode::GeneralAnswer.as_i32(), -1);
        assert_eq!(TaskCode::Classify.as_i32(), 0);
        assert_eq!(TaskCode::Knowledge.as_i32(), 1);
        assert_eq!(TaskCode::SubmitJob.as_i32(), 2);
        assert_eq!(TaskCode::FetchJobResult.as_i32(), 3);
    }

    #[test]
    fn round_trip_through_json() {
        for code in [
            TaskCode::UpstreamAuth,
            TaskCode::GeneralAnswer,
            TaskCode::Knowledge,
            TaskCode::FetchJobResult,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            let back: TaskCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn unknown_code_fails_to_deserialize() {
        let err = serde_json::from_str::<TaskCode>("42");
        assert!(err.is_err());
    }
}
