//! Vector index (HNSW)
//!
//! - Hand-rolled HNSW graph over cosine distance
//! - Snapshot persistence through an `HnswStore` (sled or in-memory)
//! - Repository-scoped vector store used by hybrid search

mod distance;
mod hnsw;
mod store;
mod vector_store;

pub use distance::{cosine_distance, cosine_similarity};
pub use hnsw::*;
pub use store::{HnswStore, MemoryHnswStore, SledHnswStore};
pub use vector_store::{HnswVectorStore, VectorHit, VectorStore};
