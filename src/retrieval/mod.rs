//! Hybrid retrieval
//!
//! Combines:
//! - BM25 keyword search over a code-aware tokenizer
//! - Semantic search through a `VectorStore`
//! - Weighted Reciprocal Rank Fusion, boosts and diversity filtering
//! - Multi-signal relevance reranking

mod bm25;
mod boost;
mod cache;
mod diversity;
mod fusion;
mod hybrid;
mod relevance;
mod tokenize;

pub use bm25::*;
pub use boost::{combined_factor, compute_boosts, looks_like_definition, AppliedBoost, BoostConfig, BoostKind};
pub use cache::{CacheStats, SearchCache};
pub use diversity::{diversify, jaccard};
pub use fusion::*;
pub use hybrid::*;
pub use relevance::*;
pub use tokenize::{query_terms, split_identifier, token_set, tokenize};
