use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// One conversation turn, forwarded upstream exactly as the widget sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationMessage(pub Value);

// Widget -> relay
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ConversationMessage>,
}

// Relay -> widget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyBody {
    pub reply: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// Relay -> upstream Messages API
#[derive(Debug, Serialize)]
pub struct MessagesRequest<'a> {
    pub model: &'a str,
    pub max_tokens: u32,
    pub system: &'a str,
    pub messages: &'a [ConversationMessage],
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ChatRequest {
    /// Parses a widget body. Only the `messages` array itself is checked;
    /// its entries are left to the upstream.
    pub fn parse(body: &[u8]) -> Result<Self, RelayError> {
        let request: ChatRequest = serde_json::from_slice(body)
            .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

        if request.messages.is_empty() {
            return Err(RelayError::InvalidRequest("messages is empty".into()));
        }

        Ok(request)
    }
}

/// Keeps the last `max` messages in their original order.
pub fn trim_history(messages: &[ConversationMessage], max: usize) -> &[ConversationMessage] {
    let start = messages.len().saturating_sub(max);
    &messages[start..]
}

/// Concatenates the text blocks of a response, skipping everything else.
pub fn extract_reply(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            ContentBlock::Other => None,
        })
        .collect()
}
