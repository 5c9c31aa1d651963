use crate::models::{ChatMessage, ChatRequest, ChatResponse};
use crate::utils::truncate_chars;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// How much of an unexpected response body is kept for diagnostics.
const RAW_BODY_LIMIT: usize = 1500;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("completion service returned HTTP {status}")]
    Api { status: u16, body: String },

    #[error("malformed completion response: {reason}")]
    Malformed { reason: String, body: String },
}

impl LlmError {
    /// Truncated raw response body, when the service sent one.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            LlmError::Network(_) => None,
            LlmError::Api { body, .. } | LlmError::Malformed { body, .. } => Some(body),
        }
    }
}

/// Opaque text completion: one prompt in, free text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Client for an OpenAI-compatible chat completions endpoint (Groq by default).
pub struct LLMClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl LLMClient {
    pub fn new(api_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(LLMClient {
            client,
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl CompletionService for LLMClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Requesting completion");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: truncate_chars(&body, RAW_BODY_LIMIT),
            });
        }

        parse_completion(&body)
    }
}

/// Pull the first choice's message text out of a chat completion body.
pub fn parse_completion(body: &str) -> Result<String, LlmError> {
    let malformed = |reason: String| LlmError::Malformed {
        reason,
        body: truncate_chars(body, RAW_BODY_LIMIT),
    };

    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| malformed("no message content in first choice".to_string()))
}
