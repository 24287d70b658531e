//! LLM chat collaborator
//!
//! The review engine talks to language models only through [`LlmClient`], so
//! tests can substitute scripted clients and deployments can plug in any
//! OpenAI-compatible endpoint.

mod http;

pub use http::OpenAiCompatClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Per-call overrides, passed through to the client untouched by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
}

/// Full response text of a chat call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
}

/// Errors from LLM calls
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API key not found. Set {env_var} environment variable")]
    MissingApiKey { env_var: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request timed out")]
    Timeout,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
}

/// Chat-completion collaborator
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a conversation and return the complete response text.
    ///
    /// Implementations may stream internally; callers only see the
    /// accumulated content.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &LlmOptions,
    ) -> Result<ChatResponse, LlmError>;
}
