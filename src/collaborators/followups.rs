//! Follow-up generator: asks the LLM for short next questions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::{MAX_FOLLOWUPS, Message};

use super::FollowupGenerator;

/// Temperature for follow-up suggestions (a little variety is fine).
const FOLLOWUP_TEMPERATURE: f32 = 0.3;

/// Max tokens for the follow-up call.
const FOLLOWUP_MAX_TOKENS: u32 = 256;

/// Recent turns shown to the model.
const HISTORY_WINDOW: usize = 6;

/// Per-turn character cap for the history excerpt.
const TURN_PREVIEW_CHARS: usize = 600;

/// Generates follow-up questions with a non-streaming completion.
pub struct LlmFollowupGenerator {
    llm: Arc<dyn LlmProvider>,
}

impl LlmFollowupGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl FollowupGenerator for LlmFollowupGenerator {
    async fn generate(
        &self,
        history: &[Message],
        final_answer: &str,
        location: Option<&str>,
    ) -> Result<Vec<String>, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(history, final_answer, location)),
        ])
        .with_temperature(FOLLOWUP_TEMPERATURE)
        .with_max_tokens(FOLLOWUP_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let followups = parse_followups(&response.content).map_err(|e| {
            warn!(raw_response = %response.content, error = %e, "Unparseable follow-ups");
            PipelineError::Followups(e)
        })?;

        debug!(count = followups.len(), "Generated follow-ups");
        Ok(followups)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    format!(
        "You suggest follow-up questions for a career-coaching chat. Given the recent \
         conversation, write 1-{MAX_FOLLOWUPS} short questions the user is likely to ask next.\n\n\
         Rules:\n\
         - Write from the user's point of view (\"How long is the training?\")\n\
         - Max 12 words each\n\
         - Stay on careers, training, pay and job searching\n\
         - Don't repeat questions already answered\n\n\
         Respond with ONLY a JSON array of strings, e.g. [\"What does it pay?\", \"Is there an apprenticeship?\"]"
    )
}

fn build_user_prompt(history: &[Message], final_answer: &str, location: Option<&str>) -> String {
    let mut prompt = String::with_capacity(1024);

    if let Some(loc) = location {
        prompt.push_str(&format!("User location: {loc}\n\n"));
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    prompt.push_str("Conversation:\n");
    for message in &history[start..] {
        let preview: String = message.content.chars().take(TURN_PREVIEW_CHARS).collect();
        prompt.push_str(&format!("[{}] {}\n", message.role, preview));
    }

    let ends_with_answer = history
        .last()
        .is_some_and(|m| m.content == final_answer);
    if !final_answer.is_empty() && !ends_with_answer {
        let preview: String = final_answer.chars().take(TURN_PREVIEW_CHARS).collect();
        prompt.push_str(&format!("[assistant] {preview}\n"));
    }

    prompt
}

// ── Response parsing ────────────────────────────────────────────────

/// Parse the model output into at most `MAX_FOLLOWUPS` non-empty questions.
fn parse_followups(raw: &str) -> Result<Vec<String>, String> {
    let json_str = extract_json_array(raw);
    let items: Vec<String> =
        serde_json::from_str(&json_str).map_err(|e| format!("JSON parse error: {e}"))?;

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(MAX_FOLLOWUPS)
        .collect())
}

/// Extract a JSON array from LLM output (handles markdown wrapping).
fn extract_json_array(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('[') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        let after = after.strip_prefix("json").unwrap_or(after);
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('[') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
