//! A convenience wrapper over [`LlmProvider::chat`] for the gateway's single-call
//! text completion pattern: one system prompt, one user turn, one text reply.
//!
//! The classifier, general-answer branch, and remote-job parameter-repair
//! loop all share this shape — none of them need multi-turn history, tool
//! calls, or streaming at the provider boundary.

use crate::traits::{ChatRequest, LlmProvider};
use rsa_domain::error::{Error, Result};
use rsa_domain::tool::{Message, MessageContent, Role};
use std::sync::Arc;

/// Send a single system+user turn to `provider` and return the text reply.
///
/// Returns [`Error::Provider`] if the provider responds with empty content.
pub async fn generate_response(
    provider: &Arc<dyn LlmProvider>,
    system_text: &str,
    human_text: &str,
) -> Result<String> {
    let messages = vec![
        Message {
            role: Role::System,
            content: MessageContent::Text(system_text.to_string()),
        },
        Message {
            role: Role::User,
            content: MessageContent::Text(human_text.to_string()),
        },
    ];

    let req = ChatRequest {
        messages,
        ..Default::default()
    };

    let resp = provider.chat(req).await?;
    if resp.content.trim().is_empty() {
        return Err(Error::Provider {
            provider: provider.provider_id().to_string(),
            message: "empty completion content".into(),
        });
    }
    Ok(resp.content)
}
