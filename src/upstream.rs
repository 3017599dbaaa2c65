use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::UpstreamConfig;
use crate::protocol::{extract_reply, ConversationMessage, MessagesRequest, MessagesResponse};

const MESSAGES_PATH: &str = "/v1/messages";

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Client for the Messages API. Owns the API key; nothing else in the
/// process sees it.
pub struct CompletionClient {
    client: Client,
    url: String,
    api_key: String,
    api_version: String,
    model: String,
    max_tokens: u32,
    system_prompt: String,
}

impl CompletionClient {
    pub fn new(config: &UpstreamConfig, api_key: String) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), MESSAGES_PATH),
            api_key,
            api_version: config.api_version.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends one completion request and returns the concatenated text reply.
    /// No retries.
    pub async fn complete(&self, messages: &[ConversationMessage]) -> Result<String, UpstreamError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system: &self.system_prompt,
            messages,
        };

        let response = self
            .client
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let parsed: MessagesResponse = serde_json::from_slice(&bytes)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        Ok(extract_reply(&parsed.content))
    }
}
