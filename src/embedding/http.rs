//! Embedding backend for OpenAI-compatible `/v1/embeddings` endpoints
//!
//! Works with OpenAI, Azure OpenAI and local servers that mimic the API
//! (LM Studio, vLLM, Ollama, text-embeddings-inference).

use super::traits::{EmbeddingBackend, EmbeddingError, EmbeddingResult};
use crate::config::EmbeddingConfig;
use crate::types::Embedding;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocking HTTP embedding backend
#[derive(Debug)]
pub struct HttpBackend {
    client: Client,
    config: EmbeddingConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpBackend {
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        info!(
            "Initializing HTTP embedding backend: endpoint={}, model={}",
            config.endpoint, config.model
        );

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());

        match &api_key {
            Some(key) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", key)).map_err(|e| {
                        EmbeddingError::Config(format!("Invalid API key format: {}", e))
                    })?,
                );
            }
            None if config.endpoint.contains("openai.com") => {
                warn!("No API key provided for {}", config.endpoint);
            }
            None => {}
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn request_embeddings(&self, texts: &[&str]) -> EmbeddingResult<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts.to_vec(),
            // Only text-embedding-3 models accept a dimensions override
            dimensions: self
                .config
                .model
                .contains("text-embedding-3")
                .then_some(self.config.dimensions),
            encoding_format: "float",
        };

        debug!(
            "Sending embedding request to {} for {} texts",
            self.config.endpoint,
            texts.len()
        );

        let body = serde_json::to_vec(&request).map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to serialize request: {}", e))
        })?;

        // reqwest::blocking panics inside a tokio runtime, so the call runs on
        // its own scoped thread.
        let response = std::thread::scope(|s| {
            s.spawn(|| self.client.post(&self.config.endpoint).body(body).send())
                .join()
        })
        .map_err(|_| EmbeddingError::EmbeddingFailed("HTTP request thread panicked".to_string()))??;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000);
            return Err(EmbeddingError::RateLimited { retry_after_ms });
        }

        if !status.is_success() {
            let error_text = response.text().unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "API error ({}): {}",
                status, message
            )));
        }

        let parsed: EmbeddingResponse = response.json().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to parse response: {}", e))
        })?;

        if let Some(usage) = &parsed.usage {
            debug!("Embedding request used {} tokens", usage.total_tokens);
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);

        data.into_iter()
            .map(|d| {
                if d.embedding.len() != self.config.dimensions {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected: self.config.dimensions,
                        actual: d.embedding.len(),
                    });
                }
                Ok(normalize_embedding(&d.embedding))
            })
            .collect()
    }
}

impl EmbeddingBackend for HttpBackend {
    fn embed(&self, text: &str) -> EmbeddingResult<Embedding> {
        self.request_embeddings(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        let mut all = Vec::with_capacity(texts.len());
        for chunk in refs.chunks(self.config.max_batch_size.max(1)) {
            all.extend(self.request_embeddings(chunk)?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Scale a vector to unit length; zero vectors are returned unchanged
pub fn normalize_embedding(embedding: &[f32]) -> Embedding {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_embedding() {
        let normalized = normalize_embedding(&[3.0, 4.0]);
        assert!((normalized[0] - 0.6).abs() < 1e-6);
        assert!((normalized[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector() {
        assert_eq!(normalize_embedding(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_backend_reports_configured_dimensions() {
        let config = EmbeddingConfig {
            endpoint: "http://localhost:1234/v1/embeddings".to_string(),
            api_key: Some("test-key".to_string()),
            dimensions: 768,
            ..EmbeddingConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert_eq!(backend.dimensions(), 768);
        assert_eq!(backend.name(), "http");
    }

    #[test]
    fn test_embed_batch_empty_input() {
        let config = EmbeddingConfig {
            api_key: Some("k".to_string()),
            ..EmbeddingConfig::default()
        };
        let backend = HttpBackend::new(&config).unwrap();
        assert!(backend.embed_batch(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_request_omits_dimensions_for_other_models() {
        let request = EmbeddingRequest {
            model: "nomic-embed-text",
            input: vec!["hello"],
            dimensions: None,
            encoding_format: "float",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("dimensions").is_none());
        assert_eq!(json["input"][0], "hello");
    }
}
