pub mod anthropic;
pub mod credit;
pub mod llm_text;
pub mod openai_compat;
pub mod rag;
pub mod registry;
pub mod remote_job;
pub mod session_remote;
pub mod traits;
pub(crate) mod sse;
pub(crate) mod util;

// Re-exports for convenience.
pub use credit::{CreditClient, HttpCreditClient};
pub use llm_text::generate_response;
pub use rag::{HttpRagClient, RagClient, RagSnippet};
pub use registry::ProviderRegistry;
pub use remote_job::{HttpRemoteJobClient, RemoteJobClient};
pub use session_remote::RemoteSessionClient;
pub use traits::{ChatRequest, ChatResponse, EmbeddingsRequest, EmbeddingsResponse, LlmProvider};
