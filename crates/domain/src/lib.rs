pub mod abort;
pub mod billing;
pub mod capability;
pub mod chat_session;
pub mod config;
pub mod credit;
pub mod error;
pub mod keyword;
pub mod progress;
pub mod remote_job;
pub mod session_backend;
pub mod stream;
pub mod task_code;
pub mod tool;
pub mod trace;

pub use abort::{AbortMap, AbortToken};
pub use billing::{BillingCounter, BillingDetail};
pub use chat_session::{ChatMessage, ChatRole, ChatSession};
pub use config::{Config, DeploymentMode};
pub use credit::{CreditCheckRequest, CreditCheckResponse, CreditInfo, CreditUpdateRequest, CreditUpdateResponse};
pub use error::{Error, Result};
pub use keyword::{Keyword, KeywordSet};
pub use progress::{ProgressEvent, ProgressStage};
pub use remote_job::{JobTask, ObservationMode, RemoteJobRun, Scenario, TaskDescriptor};
pub use session_backend::RemoteSessionBackend;
pub use task_code::TaskCode;
