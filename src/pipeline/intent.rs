//! Keyword intent classifier.
//!
//! Intent is currently informational only: it is logged and exposed for
//! future routing, but does not change the answer.

use serde::Serialize;
use tracing::debug;

/// What the user appears to want from this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Wants a career-match quiz or recommendation.
    Quiz,
    /// General conversation.
    Chat,
    /// Wants a concept or process explained.
    Explain,
}

impl Intent {
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Quiz => "quiz",
            Intent::Chat => "chat",
            Intent::Explain => "explain",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Phrases signalling a quiz request. Checked first.
const QUIZ_PHRASES: &[&str] = &["quiz", "which career"];

/// Phrases signalling an explanation request.
const EXPLAIN_PHRASES: &[&str] = &["explain", "how does"];

/// Classify raw user text. Case-insensitive substring match, quiz before
/// explain, `Chat` otherwise.
pub fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();

    let intent = if QUIZ_PHRASES.iter().any(|p| lower.contains(p)) {
        Intent::Quiz
    } else if EXPLAIN_PHRASES.iter().any(|p| lower.contains(p)) {
        Intent::Explain
    } else {
        Intent::Chat
    };

    debug!(intent = %intent, chars = text.chars().count(), "Classified user intent");
    intent
}
