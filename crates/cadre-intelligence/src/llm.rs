//! LLM provider abstraction.
//!
//! A single OpenAI-compatible chat-completions shape is assumed across all
//! three tiers — only the target model name differs (§4.6, §6).

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::HttpError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmRole::System => write!(f, "system"),
            LlmRole::User => write!(f, "user"),
            LlmRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(LlmRole::User, content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4".into(),
            max_tokens: 2048,
            temperature: 0.7,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError>;
}

/// OpenAI-compatible chat-completions endpoint (§6): request carries
/// `{model, messages, max_tokens, temperature}`; response is parsed from
/// `choices[0].message.content` and `usage{prompt_tokens,completion_tokens}`.
pub struct HttpChatProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpChatProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn build_request_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role.to_string(),
                    "content": m.content,
                })
            })
            .collect();
        serde_json::json!({
            "model": config.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }
}

#[async_trait]
impl LlmProvider for HttpChatProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let body = Self::build_request_body(messages, config);
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value = resp.json().await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ParseError("missing choices[0].message.content".into()))?
            .to_string();
        let input_tokens = value["usage"]["prompt_tokens"].as_u64().unwrap_or(0);
        let output_tokens = value["usage"]["completion_tokens"].as_u64().unwrap_or(0);

        Ok(LlmResponse {
            content,
            model: config.model.clone(),
            input_tokens,
            output_tokens,
        })
    }
}

/// Deterministic stand-in used by tests and dry runs.
#[derive(Default)]
pub struct MockProvider {
    response: std::sync::Mutex<Option<LlmResponse>>,
    error: std::sync::Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: LlmResponse) -> Self {
        *self.response.lock().unwrap() = Some(response);
        self
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        *self.error.lock().unwrap() = Some(message.into());
        self
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(
        &self,
        _messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        if let Some(message) = self.error.lock().unwrap().clone() {
            return Err(LlmError::ApiError {
                status: 500,
                message,
            });
        }
        if let Some(resp) = self.response.lock().unwrap().clone() {
            return Ok(resp);
        }
        Ok(LlmResponse {
            content: "mock response".into(),
            model: config.model.clone(),
            input_tokens: 10,
            output_tokens: 10,
        })
    }
}
