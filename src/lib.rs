//! revindex: code retrieval and multi-pass pull request review
//!
//! - HNSW vector index with pluggable persistence
//! - BM25 keyword search over a code-aware tokenizer
//! - Hybrid retrieval (weighted RRF fusion, boosts, diversity filtering)
//! - Multi-signal relevance reranking
//! - Multi-pass LLM review of pull requests with bounded concurrency

pub mod config;
pub mod embedding;
pub mod index;
pub mod llm;
pub mod retrieval;
pub mod review;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
