//! LLM collaborator configuration

use serde::{Deserialize, Serialize};

/// Chat-completion provider configuration
///
/// ```toml
/// [llm]
/// provider = "openai"
/// endpoint = "https://api.openai.com/v1/chat/completions"
/// model = "gpt-4o-mini"
/// api_key_env = "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider label passed through to the client
    pub provider: String,
    /// Chat completions endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Inline API key (prefer `api_key_env`)
    pub api_key: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 180,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the inline value or the configured env var
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}
