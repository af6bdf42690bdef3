//! Question generation behind a small async trait.
//!
//! The dispatcher hands a finished context window to a [`QuestionGenerator`]
//! and awaits one free-text answer. [`OpenAiGenerator`] talks to any
//! OpenAI-compatible `/chat/completions` endpoint. Timeouts belong to the
//! HTTP client; there are no retries.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;

use crate::config::GeneratorConfig;
use crate::model::message::Message;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no API key configured (set OPENAI_TOKEN or OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Produces a follow-up question for an ordered role/content message list.
#[async_trait]
pub trait QuestionGenerator: Send + Sync {
    async fn generate(&self, messages: &[Message]) -> Result<String, GenerationError>;

    /// Model identifier, for logs and transcripts.
    fn model_name(&self) -> &str;
}

/// Chat-completions client.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(GenerationError::MissingApiKey)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuestionGenerator for OpenAiGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<String, GenerationError> {
        let request = json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response_data: serde_json::Value = response.json().await?;
        extract_content(&response_data)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn extract_content(value: &serde_json::Value) -> Result<String, GenerationError> {
    value["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GenerationError::InvalidResponse("missing choices[0].message.content".into()))
}
