//! Chat request envelope and response unwrapping.

use crate::error::MalformedReason;
use serde::Serialize;
use serde_json::Value;

/// Request body sent to every backend: a single user message, no history, no parameters.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest<'a> {
    pub messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> ChatRequest<'a> {
    #[must_use]
    pub fn user(prompt: &'a str) -> Self {
        Self {
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

/// Pull `choices[0].message.content` out of a chat-completions reply.
///
/// String content is returned as-is. Structured content (object, array, number, bool) is
/// returned as compact JSON text. `null` counts as missing.
///
/// # Errors
///
/// Returns [`MalformedReason::MissingChoices`] if `choices` is absent or empty and
/// [`MalformedReason::MissingContent`] if the first choice has no usable content.
pub fn extract_content(body: &Value) -> Result<String, MalformedReason> {
    let first = body
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .ok_or(MalformedReason::MissingChoices)?;

    let content = first
        .get("message")
        .and_then(|m| m.get("content"))
        .ok_or(MalformedReason::MissingContent)?;

    match content {
        Value::Null => Err(MalformedReason::MissingContent),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

/// Parse a raw reply body and unwrap its content.
///
/// # Errors
///
/// Returns [`MalformedReason::NotJson`] for bodies that are not JSON, otherwise the errors
/// of [`extract_content`].
pub fn parse_reply(bytes: &[u8]) -> Result<String, MalformedReason> {
    let body: Value = serde_json::from_slice(bytes).map_err(|_| MalformedReason::NotJson)?;
    extract_content(&body)
}
