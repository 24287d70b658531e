//! Embedding backends
//!
//! Embeddings feed the HNSW index at indexing time and turn queries into
//! vectors at search time. Any OpenAI-compatible endpoint works:
//!
//! ```toml
//! [embedding]
//! endpoint = "http://localhost:1234/v1/embeddings"
//! model = "nomic-embed-text-v1.5"
//! dimensions = 768
//! ```

mod http;
mod traits;

pub use http::{normalize_embedding, HttpBackend};
pub use traits::{EmbeddingBackend, EmbeddingError, EmbeddingResult};
