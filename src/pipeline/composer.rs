//! Builds the message list sent to the completion service.

use crate::llm::ChatMessage;

use super::types::Message;

/// System fact telling the model where the user is.
pub fn location_fact(location: &str) -> String {
    format!(
        "The user's location is {location}. When it helps, tailor programs, employers, wages \
         and licensing details to this area."
    )
}

/// Compose the outbound messages: base prompt, then the location fact when a
/// non-blank location is known, then the conversation in its original order.
pub fn compose_messages(
    system_prompt: &str,
    effective_location: Option<&str>,
    conversation: &[Message],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 2);
    messages.push(ChatMessage::system(system_prompt));

    if let Some(location) = effective_location.map(str::trim).filter(|l| !l.is_empty()) {
        messages.push(ChatMessage::system(location_fact(location)));
    }

    messages.extend(conversation.iter().map(ChatMessage::from));
    messages
}
