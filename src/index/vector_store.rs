//! Repository-scoped semantic search over HNSW indices

use super::hnsw::HnswIndex;
use super::store::HnswStore;
use crate::config::IndexConfig;
use crate::embedding::EmbeddingBackend;
use crate::types::{DocId, Document, DocumentMetadata, Embedding, RepoId, SearchFilters};
use anyhow::{anyhow, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A semantic search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: DocId,
    /// Cosine similarity in [-1, 1]
    pub similarity: f32,
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Semantic search collaborator used by the hybrid searcher
pub trait VectorStore: Send + Sync {
    fn search(
        &self,
        repo_id: &str,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorHit>>;
}

struct RepoIndex {
    index: HnswIndex,
    documents: HashMap<DocId, Document>,
}

/// One HNSW index per repository plus the documents it points at
pub struct HnswVectorStore {
    repos: RwLock<HashMap<RepoId, Arc<RwLock<RepoIndex>>>>,
    backend: Arc<dyn EmbeddingBackend>,
    store: Option<Arc<dyn HnswStore>>,
    config: IndexConfig,
}

impl HnswVectorStore {
    pub fn new(config: IndexConfig, backend: Arc<dyn EmbeddingBackend>) -> Self {
        info!("Creating HNSW vector store with {} backend", backend.name());
        Self {
            repos: RwLock::new(HashMap::new()),
            backend,
            store: None,
            config,
        }
    }

    /// Attach a persistence collaborator for `save_repo`/`load_repo`
    pub fn with_store(mut self, store: Arc<dyn HnswStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn repo(&self, repo_id: &str) -> Option<Arc<RwLock<RepoIndex>>> {
        self.repos.read().get(repo_id).cloned()
    }

    fn repo_or_create(&self, repo_id: &str) -> Arc<RwLock<RepoIndex>> {
        if let Some(repo) = self.repo(repo_id) {
            return repo;
        }
        self.repos
            .write()
            .entry(repo_id.to_string())
            .or_insert_with(|| {
                Arc::new(RwLock::new(RepoIndex {
                    index: HnswIndex::from_config(&self.config),
                    documents: HashMap::new(),
                }))
            })
            .clone()
    }

    /// Index one document, embedding its content when no vector is supplied
    pub fn index_document(
        &self,
        repo_id: &str,
        document: Document,
        embedding: Option<Embedding>,
    ) -> Result<()> {
        let embedding = match embedding {
            Some(e) => e,
            None => self
                .backend
                .embed(&document.content)
                .with_context(|| format!("Failed to embed document {}", document.doc_id))?,
        };

        let repo = self.repo_or_create(repo_id);
        let mut guard = repo.write();
        guard.index.insert(document.doc_id.clone(), embedding);
        guard.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    /// Index many documents, batching embedding requests for those without vectors
    pub fn index_documents(
        &self,
        repo_id: &str,
        documents: Vec<(Document, Option<Embedding>)>,
    ) -> Result<usize> {
        let missing: Vec<String> = documents
            .iter()
            .filter(|(_, e)| e.is_none())
            .map(|(d, _)| d.content.clone())
            .collect();

        let mut computed = if missing.is_empty() {
            Vec::new()
        } else {
            self.backend
                .embed_batch(&missing)
                .context("Failed to embed document batch")?
        }
        .into_iter();

        let repo = self.repo_or_create(repo_id);
        let mut guard = repo.write();
        let mut count = 0;
        for (document, embedding) in documents {
            let embedding = match embedding {
                Some(e) => e,
                None => computed
                    .next()
                    .ok_or_else(|| anyhow!("Embedding backend returned too few vectors"))?,
            };
            guard.index.insert(document.doc_id.clone(), embedding);
            guard.documents.insert(document.doc_id.clone(), document);
            count += 1;
        }

        debug!("Indexed {} documents into {}", count, repo_id);
        Ok(count)
    }

    pub fn remove_document(&self, repo_id: &str, doc_id: &str) -> bool {
        let Some(repo) = self.repo(repo_id) else {
            return false;
        };
        let mut guard = repo.write();
        guard.documents.remove(doc_id);
        guard.index.remove(doc_id)
    }

    /// Drop a repository's in-memory index and its persisted copy
    pub fn clear_repo(&self, repo_id: &str) -> Result<()> {
        self.repos.write().remove(repo_id);
        if let Some(store) = &self.store {
            store.delete(repo_id)?;
        }
        Ok(())
    }

    pub fn len(&self, repo_id: &str) -> usize {
        self.repo(repo_id).map(|r| r.read().index.len()).unwrap_or(0)
    }

    pub fn save_repo(&self, repo_id: &str) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("No HNSW store configured"))?;
        let repo = self
            .repo(repo_id)
            .ok_or_else(|| anyhow!("Unknown repository: {}", repo_id))?;
        let guard = repo.read();
        store.save(repo_id, &guard.index)
    }

    /// Restore a repository's graph and attach the documents it indexes.
    ///
    /// Returns `false` when nothing was stored for the repository.
    pub fn load_repo(&self, repo_id: &str, documents: Vec<Document>) -> Result<bool> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| anyhow!("No HNSW store configured"))?;
        let Some(index) = store.load(repo_id)? else {
            return Ok(false);
        };

        let documents: HashMap<DocId, Document> = documents
            .into_iter()
            .filter(|d| index.contains(&d.doc_id))
            .map(|d| (d.doc_id.clone(), d))
            .collect();
        if documents.len() < index.len() {
            warn!(
                "Repository {} has {} vectors but only {} documents",
                repo_id,
                index.len(),
                documents.len()
            );
        }

        info!("Loaded HNSW index for {} ({} nodes)", repo_id, index.len());
        self.repos.write().insert(
            repo_id.to_string(),
            Arc::new(RwLock::new(RepoIndex { index, documents })),
        );
        Ok(true)
    }

    /// Search with a precomputed query vector
    pub fn search_by_vector(
        &self,
        repo_id: &str,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Vec<VectorHit> {
        let Some(repo) = self.repo(repo_id) else {
            return Vec::new();
        };
        if limit == 0 {
            return Vec::new();
        }

        // The read guard spans the whole traversal
        let guard = repo.read();
        let fetch = if filters.is_empty() { limit } else { limit * 4 };

        guard
            .index
            .search(query, fetch)
            .into_iter()
            .filter_map(|hit| {
                let doc = guard.documents.get(&hit.id)?;
                filters.matches(&doc.metadata).then(|| VectorHit {
                    similarity: hit.similarity(),
                    id: hit.id,
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                })
            })
            .take(limit)
            .collect()
    }
}

impl VectorStore for HnswVectorStore {
    fn search(
        &self,
        repo_id: &str,
        query: &str,
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<VectorHit>> {
        if self.repo(repo_id).is_none() {
            return Ok(Vec::new());
        }
        let embedding = self
            .backend
            .embed(query)
            .context("Failed to embed search query")?;
        Ok(self.search_by_vector(repo_id, &embedding, limit, filters))
    }
}
