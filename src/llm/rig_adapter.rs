//! Bridge from rig-core completion models to our `LlmProvider` trait.

use async_trait::async_trait;
use futures::StreamExt;
use rig::completion::{AssistantContent, CompletionModel};
use rig::message::Message as RigMessage;
use rig::streaming::StreamedAssistantContent;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role,
    TokenStream,
};

/// Wraps any rig `CompletionModel` (Anthropic, OpenAI, ...) as an `LlmProvider`.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }

    fn build_request(
        &self,
        request: CompletionRequest,
    ) -> Result<rig::completion::CompletionRequest, LlmError> {
        let parts = split_messages(request.messages).ok_or_else(|| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: "request has no user or assistant messages".to_string(),
        })?;

        let mut builder = self
            .model
            .completion_request(parts.prompt)
            .messages(parts.history);
        if let Some(preamble) = parts.preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let rig_request = self.build_request(request)?;
        let response = self
            .model
            .completion(rig_request)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.model_name.clone(),
                reason: e.to_string(),
            })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");
        let content = require_text(content, &self.model_name)?;

        Ok(CompletionResponse {
            content,
            input_tokens: saturate(response.usage.input_tokens),
            output_tokens: saturate(response.usage.output_tokens),
        })
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<TokenStream, LlmError> {
        let rig_request = self.build_request(request)?;
        let provider = self.model_name.clone();
        let response = self
            .model
            .stream(rig_request)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: provider.clone(),
                reason: e.to_string(),
            })?;

        let tokens = response.filter_map(move |item| {
            let mapped = match item {
                Ok(StreamedAssistantContent::Text(text)) => Some(Ok(text.text)),
                Ok(_) => None,
                Err(e) => Some(Err(LlmError::StreamFailed {
                    provider: provider.clone(),
                    reason: e.to_string(),
                })),
            };
            futures::future::ready(mapped)
        });

        Ok(Box::pin(tokens))
    }
}

/// Messages reshaped for rig: system text becomes the preamble, the final
/// turn is the prompt, everything before it is chat history.
struct RigMessages {
    preamble: Option<String>,
    history: Vec<RigMessage>,
    prompt: RigMessage,
}

fn split_messages(messages: Vec<ChatMessage>) -> Option<RigMessages> {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.content),
            Role::User => turns.push(RigMessage::user(message.content)),
            Role::Assistant => turns.push(RigMessage::assistant(message.content)),
        }
    }

    let prompt = turns.pop()?;
    let preamble = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    Some(RigMessages {
        preamble,
        history: turns,
        prompt,
    })
}

/// A completion with no text (only tool calls, or nothing at all) is unusable here.
fn require_text(content: String, provider: &str) -> Result<String, LlmError> {
    if content.trim().is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "completion contained no text".to_string(),
        });
    }
    Ok(content)
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
