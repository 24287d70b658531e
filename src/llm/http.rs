//! Client for OpenAI-compatible chat completion endpoints

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, LlmOptions};
use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    /// Null for some reasoning models
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Works with OpenAI, Azure OpenAI, Ollama, vLLM and LM Studio
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    provider: String,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompatClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.resolve_api_key();
        if api_key.is_none() && config.provider != "ollama" {
            return Err(LlmError::MissingApiKey {
                env_var: config.api_key_env.clone(),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            provider: config.provider.clone(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    fn map_send_error(e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        options: &LlmOptions,
    ) -> Result<ChatResponse, LlmError> {
        let provider = options.provider.as_deref().unwrap_or(&self.provider);
        if !matches!(provider, "openai" | "custom" | "ollama" | "azure") {
            return Err(LlmError::UnsupportedProvider(provider.to_string()));
        }

        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = ChatRequest {
            model,
            messages,
            temperature: Some(options.temperature.unwrap_or(self.temperature)),
            stream: false,
        };

        debug!(
            "Sending chat request to {} (model={}, {} messages)",
            self.endpoint,
            model,
            messages.len()
        );

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = options.api_key.as_ref().or(self.api_key.as_ref()) {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(Self::map_send_error)?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(LlmError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(format!("Invalid completion body: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("Completion had no content".to_string()))?;

        Ok(ChatResponse { content })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let config = LlmConfig {
            api_key_env: "REVINDEX_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        match OpenAiCompatClient::new(&config) {
            Err(LlmError::MissingApiKey { env_var }) => assert_eq!(env_var, "REVINDEX_TEST_UNSET_KEY"),
            other => panic!("expected MissingApiKey, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            api_key_env: "REVINDEX_TEST_UNSET_KEY".to_string(),
            ..LlmConfig::default()
        };
        assert!(OpenAiCompatClient::new(&config).is_ok());
    }

    #[test]
    fn test_request_shape() {
        let messages = vec![ChatMessage::system("sys"), ChatMessage::user("hello")];
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            temperature: Some(0.2),
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_completion_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#;
        let parsed: ChatCompletion = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_unsupported_provider_override() {
        let client = OpenAiCompatClient::new(&config_with_key()).unwrap();
        let options = LlmOptions {
            provider: Some("anthropic".to_string()),
            ..Default::default()
        };
        let err = client.stream_chat(&[ChatMessage::user("x")], &options).await.unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedProvider(p) if p == "anthropic"));
    }
}
