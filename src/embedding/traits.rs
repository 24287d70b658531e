//! Embedding backend trait

use crate::types::Embedding;
use std::fmt::Debug;

/// Errors that can occur while producing embeddings
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds, if provided by the API
        retry_after_ms: Option<u64>,
    },

    #[error("Embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Produces query and document embeddings.
///
/// Object-safe so stores can hold `Arc<dyn EmbeddingBackend>`.
pub trait EmbeddingBackend: Send + Sync + Debug {
    fn embed(&self, text: &str) -> EmbeddingResult<Embedding>;

    /// Embed a batch of texts, preserving input order.
    ///
    /// The default implementation calls `embed` for each text.
    fn embed_batch(&self, texts: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;

    /// Backend name for logs (e.g. "http")
    fn name(&self) -> &str;
}
