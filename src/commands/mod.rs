pub mod index;
pub mod init;
pub mod review;
pub mod search;

use anyhow::{Context, Result};
use revindex::config::Config;
use revindex::embedding::HttpBackend;
use revindex::index::{HnswVectorStore, SledHnswStore};
use revindex::retrieval::HybridSearcher;
use revindex::types::Document;
use std::sync::Arc;
use tracing::{debug, info};

/// Read the keyword documents saved for a repository (empty if none)
pub fn load_documents(config: &Config, repo: &str) -> Result<Vec<Document>> {
    let path = config.storage.documents_path(repo);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_documents(config: &Config, repo: &str, documents: &[Document]) -> Result<()> {
    let path = config.storage.documents_path(repo);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(documents)?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Vector store backed by the on-disk HNSW snapshots
pub fn open_vector_store(config: &Config) -> Result<Arc<HnswVectorStore>> {
    let backend = HttpBackend::new(&config.embedding).context("Failed to initialize embedding backend")?;
    let store = SledHnswStore::open(config.storage.hnsw_db_path())?;
    Ok(Arc::new(
        HnswVectorStore::new(config.index.clone(), Arc::new(backend)).with_store(Arc::new(store)),
    ))
}

/// Hybrid searcher over a repository's saved documents and graph
pub fn open_searcher(config: &Config, repo: &str) -> Result<HybridSearcher> {
    let documents = load_documents(config, repo)?;
    if documents.is_empty() {
        anyhow::bail!("Repository '{}' has no indexed documents", repo);
    }

    let vector_store = open_vector_store(config)?;
    let semantic = vector_store.load_repo(repo, documents.clone())?;
    if !semantic {
        debug!("No vector index stored for {}, searching keywords only", repo);
    }

    let searcher = HybridSearcher::new(
        config.search.clone(),
        semantic.then(|| vector_store as Arc<dyn revindex::index::VectorStore>),
    );
    info!("Loaded {} documents for {}", documents.len(), repo);
    searcher.add_documents(repo, documents)?;
    Ok(searcher)
}
