//! Shared types for the turn pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::{ChatMessage, Role};

/// Maximum number of follow-up suggestions surfaced with any answer.
pub const MAX_FOLLOWUPS: usize = 3;

// ── Conversation ────────────────────────────────────────────────────

/// One turn in a conversation.
///
/// Conversations are ordered oldest first. Messages are never edited in
/// place; new turns are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Client-supplied ID, or a fresh UUID when omitted.
    #[serde(default = "new_message_id")]
    pub id: String,
    pub role: Role,
    pub content: String,
}

fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_message_id(),
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        ChatMessage {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Content of the most recent user turn, or `""` when there is none.
pub fn last_user_text(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

// ── Inbound request ─────────────────────────────────────────────────

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub location: Option<String>,
}

// ── Preamble ────────────────────────────────────────────────────────

/// Output of the preamble step: the grounded context for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreambleResult {
    /// Normalized conversation to send to the model (may include reference
    /// material as leading system messages).
    pub messages_for_llm: Vec<Message>,
    /// Raw text of the last user message.
    pub last_user_raw: String,
    /// Location to ground the answer in, if any.
    pub effective_location: Option<String>,
    /// Text retrieved from the internal knowledge base. Empty when the
    /// knowledge base was not consulted.
    pub internal_rag: String,
    /// The query is outside the coaching domain.
    pub domain_guarded: bool,
}

impl PreambleResult {
    pub fn used_internal_rag(&self) -> bool {
        !self.internal_rag.trim().is_empty()
    }
}

// ── Listings ────────────────────────────────────────────────────────

/// A marketplace job or program matched to the user's query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedListing {
    pub title: String,
    pub org: String,
    pub location: String,
}

// ── Outbound ────────────────────────────────────────────────────────

/// Authoritative end-of-stream payload: the enriched answer and suggestions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalPayload {
    pub final_answer: String,
    pub followups: Vec<String>,
}

/// Body of every non-streaming reply (guard, location-required, error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyBody {
    pub answer: String,
    pub followups: Vec<String>,
}

/// Outcome class of a non-streaming reply, mapped to an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Ok,
    Error,
}

/// A complete, non-streaming reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub status: ReplyStatus,
    pub body: ReplyBody,
}

impl TurnReply {
    pub fn ok(answer: impl Into<String>, followups: Vec<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            body: ReplyBody {
                answer: answer.into(),
                followups: cap_followups(followups),
            },
        }
    }

    pub fn error(answer: impl Into<String>, followups: Vec<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            body: ReplyBody {
                answer: answer.into(),
                followups: cap_followups(followups),
            },
        }
    }
}

/// Trim, drop blanks and keep at most `MAX_FOLLOWUPS` suggestions.
pub fn cap_followups(followups: Vec<String>) -> Vec<String> {
    followups
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .take(MAX_FOLLOWUPS)
        .collect()
}
