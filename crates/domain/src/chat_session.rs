use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A persisted conversation (§3 Chat Session).
///
/// `session_id` is minted as a millisecond-epoch decimal string, matching
/// `chat_service.py`'s `str(int(datetime.now().timestamp() * 1000))` — the
/// id format is an Open Question in spec.md; this follows the original
/// (see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(session_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
        }
    }

    pub fn mint_session_id() -> String {
        Utc::now().timestamp_millis().to_string()
    }

    /// Append a user/assistant turn and enforce `MAX_MESSAGES` by keeping
    /// the first 2 plus the most recent `(max - 2)` messages (§3, §4.6).
    pub fn append_turn(&mut self, user: ChatMessage, assistant: ChatMessage, max_messages: usize) {
        self.messages.push(user);
        self.messages.push(assistant);
        self.updated_at = Utc::now();
        truncate_keep_head_and_tail(&mut self.messages, max_messages);
    }

    /// Context visible to handlers, truncated to `MAX_CONTEXT` (§4.1 step 3),
    /// always preserving the first 2 + tail.
    pub fn context_window(&self, max_context: usize) -> Vec<ChatMessage> {
        let mut copy = self.messages.clone();
        truncate_keep_head_and_tail(&mut copy, max_context);
        copy
    }
}

fn truncate_keep_head_and_tail(messages: &mut Vec<ChatMessage>, cap: usize) {
    if messages.len() <= cap || cap < 2 {
        return;
    }
    let head: Vec<ChatMessage> = messages[..2].to_vec();
    let tail_len = cap - 2;
    let tail: Vec<ChatMessage> = messages[messages.len() - tail_len..].to_vec();
    *messages = head.into_iter().chain(tail).collect();
}

/// Build a short title from the user's first message: used when title
/// generation via LLM fails or the caller has no LLM handy. "first few
/// words" per `original_source`; the exact split point when the prompt is
/// empty is left undefined by the source (see DESIGN.md Open Question 3).
pub fn fallback_title(user_prompt: &str) -> String {
    let words: Vec<&str> = user_prompt.split_whitespace().take(3).collect();
    let joined = words.join(" ");
    clean_title(&joined)
}

/// Clean an LLM-generated (or fallback) title: strip quotes/newlines,
/// truncate to 20 chars (§4.6).
pub fn clean_title(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '"' && *c != '\'' && *c != '\n' && *c != '\r')
        .collect();
    let trimmed = cleaned.trim();
    trimmed.chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cap_preserves_first_two_messages() {
        let mut session = ChatSession::new("1", "t");
        for i in 0..24 {
            session.append_turn(
                ChatMessage::user(format!("u{i}")),
                ChatMessage::assistant(format!("a{i}")),
                50,
            );
        }
        assert_eq!(session.messages.len(), 48);
        // one more turn pushes to 50, still under cap
        session.append_turn(ChatMessage::user("u24"), ChatMessage::assistant("a24"), 50);
        assert_eq!(session.messages.len(), 50);
        let first_user = &session.messages[0];
        assert_eq!(first_user.content, "u0");

        // one more turn would exceed 50 -> truncate to head(2) + tail(48)
        session.append_turn(ChatMessage::user("u25"), ChatMessage::assistant("a25"), 50);
        assert_eq!(session.messages.len(), 50);
        assert_eq!(session.messages[0].content, "u0");
        assert_eq!(session.messages[1].content, "a0");
        assert_eq!(session.messages.last().unwrap().content, "a25");
    }

    #[test]
    fn title_is_cleaned_and_truncated() {
        let t = clean_title("\"a very long session title that exceeds twenty\"\n");
        assert_eq!(t.len(), 20);
        assert!(!t.contains('"'));
    }

    #[test]
    fn fallback_title_uses_first_three_words() {
        assert_eq!(fallback_title("what is microwave remote sensing"), "what is microwave");
    }

    #[test]
    fn context_window_respects_cap() {
        let mut session = ChatSession::new("1", "t");
        for i in 0..20 {
            session.messages.push(ChatMessage::user(format!("m{i}")));
        }
        let ctx = session.context_window(10);
        assert_eq!(ctx.len(), 10);
        assert_eq!(ctx[0].content, "m0");
    }
}
