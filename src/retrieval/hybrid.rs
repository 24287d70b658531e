//! Hybrid retrieval combining semantic and keyword search

use super::{
    boost::{combined_factor, compute_boosts, AppliedBoost, BoostConfig},
    bm25::{KeywordIndex, KeywordSearchOptions},
    cache::{CacheStats, SearchCache},
    diversity::diversify,
    fusion::{reciprocal_rank_fusion, to_ranked_results, RetrievalMethod, RrfConfig, WeightedList},
    tokenize::query_terms,
};
use crate::config::SearchConfig;
use crate::index::{VectorHit, VectorStore};
use crate::types::{DocId, Document, DocumentMetadata, RepoId, SearchFilters};
use crate::util::truncate_str;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use anyhow::Result;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-query options
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridSearchOptions {
    /// Number of results to return
    pub limit: usize,
    pub filters: SearchFilters,
    /// Apply the near-duplicate filter (also requires `enable_diversity` in config)
    pub diversify: bool,
    /// Query the vector store when one is configured
    pub semantic: bool,
}

impl Default for HybridSearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filters: SearchFilters::default(),
            diversify: true,
            semantic: true,
        }
    }
}

/// A fused and boosted search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridResult {
    pub doc_id: DocId,
    pub content: String,
    pub metadata: DocumentMetadata,
    pub keyword_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    pub keyword_score: Option<f32>,
    pub semantic_score: Option<f32>,
    /// Weighted RRF score before boosts
    pub rrf_score: f32,
    /// Final score after boosts
    pub score: f32,
    pub boosts: Vec<AppliedBoost>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    repo_id: RepoId,
    query: String,
    options: HybridSearchOptions,
}

/// Hybrid searcher over per-repository keyword indices and an optional
/// vector store
pub struct HybridSearcher {
    keyword: RwLock<HashMap<RepoId, KeywordIndex>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    cache: Mutex<SearchCache<CacheKey, Vec<HybridResult>>>,
    boosts: BoostConfig,
    config: SearchConfig,
}

impl HybridSearcher {
    /// Create a searcher; without a vector store it is keyword-only
    pub fn new(config: SearchConfig, vector_store: Option<Arc<dyn VectorStore>>) -> Self {
        info!(
            "Creating hybrid searcher (semantic: {}, rrf_k={})",
            vector_store.is_some(),
            config.rrf_k
        );
        Self {
            keyword: RwLock::new(HashMap::new()),
            vector_store,
            cache: Mutex::new(SearchCache::new(
                config.cache_size,
                Duration::from_secs(config.cache_ttl_secs),
            )),
            boosts: BoostConfig::from_config(&config),
            config,
        }
    }

    pub fn has_semantic(&self) -> bool {
        self.vector_store.is_some()
    }

    /// Index one document for `repo_id`, replacing a document with the same id
    pub fn add_document(&self, repo_id: &str, document: Document) -> Result<()> {
        self.add_documents(repo_id, std::iter::once(document))
    }

    pub fn add_documents(&self, repo_id: &str, documents: impl IntoIterator<Item = Document>) -> Result<()> {
        let mut indices = self.keyword.write();
        let index = match indices.entry(repo_id.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(KeywordIndex::new_in_memory()?),
        };
        let result = index.add_documents(documents);
        drop(indices);
        self.clear_cache();
        result
    }

    pub fn remove_document(&self, repo_id: &str, doc_id: &str) -> bool {
        let removed = self
            .keyword
            .write()
            .get_mut(repo_id)
            .is_some_and(|index| index.remove_document(doc_id));
        if removed {
            self.clear_cache();
        }
        removed
    }

    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    /// Run a hybrid search.
    ///
    /// Semantic failures degrade to keyword-only results.
    pub fn search(&self, query: &str, repo_id: &str, options: &HybridSearchOptions) -> Vec<HybridResult> {
        if query.trim().is_empty() || options.limit == 0 {
            return Vec::new();
        }

        let key = CacheKey {
            repo_id: repo_id.to_string(),
            query: query.to_string(),
            options: options.clone(),
        };
        if let Some(cached) = self.cache.lock().get(&key) {
            debug!("Search cache hit for '{}'", truncate_str(query, 50));
            return cached;
        }

        let expanded = self.config.expanded_limit.max(options.limit);

        let keyword_hits = {
            let indices = self.keyword.read();
            let keyword_options = KeywordSearchOptions {
                limit: expanded,
                filters: options.filters.clone(),
            };
            match indices.get(repo_id).map(|index| index.search(query, &keyword_options)) {
                Some(Ok(hits)) => hits,
                Some(Err(e)) => {
                    warn!("Keyword search failed for {}: {:#}", repo_id, e);
                    Vec::new()
                }
                None => Vec::new(),
            }
        };
        debug!("Keyword search: {} results", keyword_hits.len());

        let mut degraded = false;
        let semantic_hits: Vec<VectorHit> = match (&self.vector_store, options.semantic) {
            (Some(store), true) => match store.search(repo_id, query, expanded, &options.filters) {
                Ok(hits) => {
                    debug!("Semantic search: {} results", hits.len());
                    hits
                }
                Err(e) => {
                    warn!("Semantic search failed, falling back to keyword-only: {:#}", e);
                    degraded = true;
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        let keyword_ranked: Vec<(DocId, f32)> = keyword_hits
            .iter()
            .map(|h| (h.doc_id.clone(), h.score))
            .collect();
        let semantic_ranked: Vec<(DocId, f32)> = semantic_hits
            .iter()
            .map(|h| (h.id.clone(), h.similarity))
            .collect();

        let fused = reciprocal_rank_fusion(
            &[
                WeightedList {
                    method: RetrievalMethod::Keyword,
                    weight: self.config.keyword_weight,
                    results: to_ranked_results(&keyword_ranked),
                },
                WeightedList {
                    method: RetrievalMethod::Semantic,
                    weight: self.config.semantic_weight,
                    results: to_ranked_results(&semantic_ranked),
                },
            ],
            &RrfConfig { k: self.config.rrf_k },
        );

        let semantic_docs: HashMap<&str, &VectorHit> =
            semantic_hits.iter().map(|h| (h.id.as_str(), h)).collect();
        let terms = query_terms(query);
        let now = Utc::now();

        let mut results: Vec<HybridResult> = {
            let indices = self.keyword.read();
            let index = indices.get(repo_id);
            fused
                .into_iter()
                .filter_map(|f| {
                    let (content, metadata) = match index.and_then(|i| i.get_document(&f.doc_id)) {
                        Some(doc) => (doc.content.clone(), doc.metadata.clone()),
                        None => {
                            let hit = semantic_docs.get(f.doc_id.as_str())?;
                            (hit.content.clone(), hit.metadata.clone())
                        }
                    };
                    let boosts = compute_boosts(query, &terms, &content, &metadata, now, &self.boosts);
                    Some(HybridResult {
                        keyword_rank: f.rank(RetrievalMethod::Keyword),
                        semantic_rank: f.rank(RetrievalMethod::Semantic),
                        keyword_score: f.score(RetrievalMethod::Keyword),
                        semantic_score: f.score(RetrievalMethod::Semantic),
                        score: f.rrf_score * combined_factor(&boosts),
                        rrf_score: f.rrf_score,
                        doc_id: f.doc_id,
                        content,
                        metadata,
                        boosts,
                    })
                })
                .collect()
        };

        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));

        if options.diversify && self.config.enable_diversity {
            let before = results.len();
            results = diversify(results, self.config.diversity_radius, |r| r.content.as_str());
            debug!("Diversity filter: {} -> {} results", before, results.len());
        }

        results.truncate(options.limit);

        info!(
            "Hybrid search for '{}' in {}: {} results",
            truncate_str(query, 50),
            repo_id,
            results.len()
        );

        // Degraded results are not cached so the next query retries the vector store
        if !degraded {
            self.cache.lock().insert(key, results.clone());
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::BoostKind;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns a fixed ranking regardless of the query
    struct FixedStore {
        hits: Vec<VectorHit>,
        calls: AtomicUsize,
    }

    impl FixedStore {
        fn new(ids: &[(&str, &str)]) -> Self {
            Self {
                hits: ids
                    .iter()
                    .enumerate()
                    .map(|(i, (id, content))| VectorHit {
                        id: id.to_string(),
                        similarity: 0.9 - i as f32 * 0.1,
                        content: content.to_string(),
                        metadata: DocumentMetadata::default(),
                    })
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VectorStore for FixedStore {
        fn search(&self, _repo: &str, _query: &str, limit: usize, _filters: &SearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.hits.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenStore;

    impl VectorStore for BrokenStore {
        fn search(&self, _: &str, _: &str, _: usize, _: &SearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            Err(anyhow!("vector backend unavailable"))
        }
    }

    /// Fails on the first call, then serves the wrapped store
    struct RecoveringStore {
        inner: FixedStore,
        failed: std::sync::atomic::AtomicBool,
    }

    impl VectorStore for RecoveringStore {
        fn search(&self, repo: &str, query: &str, limit: usize, filters: &SearchFilters) -> anyhow::Result<Vec<VectorHit>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(anyhow!("connection reset"));
            }
            self.inner.search(repo, query, limit, filters)
        }
    }

    fn documents() -> Vec<Document> {
        vec![
            Document::new("auth", "fn verify_token(token: &str) -> bool { check signature }")
                .with_path("src/auth.rs"),
            Document::new("cache", "struct LruCache { entries: Vec<Entry> }").with_path("src/cache.rs"),
            Document::new("notes", "release notes mention token rotation").with_path("docs/notes.md"),
        ]
    }

    fn searcher(store: Option<Arc<dyn VectorStore>>) -> HybridSearcher {
        let searcher = HybridSearcher::new(SearchConfig::default(), store);
        searcher.add_documents("repo", documents()).unwrap();
        searcher
    }

    #[test]
    fn test_keyword_only_without_vector_store() {
        let searcher = searcher(None);
        let results = searcher.search("verify token", "repo", &HybridSearchOptions::default());
        assert_eq!(results[0].doc_id, "auth");
        assert!(results.iter().all(|r| r.semantic_rank.is_none()));
        assert!(!searcher.has_semantic());
    }

    #[test]
    fn test_semantic_failure_degrades_to_keyword() {
        let searcher = searcher(Some(Arc::new(BrokenStore)));
        let results = searcher.search("token", "repo", &HybridSearchOptions::default());
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.keyword_rank.is_some()));
    }

    #[test]
    fn test_degraded_results_not_cached() {
        let store = Arc::new(RecoveringStore {
            inner: FixedStore::new(&[("cache", "")]),
            failed: std::sync::atomic::AtomicBool::new(false),
        });
        let searcher = searcher(Some(store.clone() as Arc<dyn VectorStore>));
        let opts = HybridSearchOptions::default();

        let degraded = searcher.search("token", "repo", &opts);
        assert!(degraded.iter().all(|r| r.semantic_rank.is_none()));
        assert_eq!(searcher.cache_stats().size, 0);

        let recovered = searcher.search("token", "repo", &opts);
        assert_eq!(store.inner.calls.load(Ordering::SeqCst), 1);
        assert!(recovered.iter().any(|r| r.doc_id == "cache" && r.semantic_rank == Some(1)));
        assert_eq!(searcher.cache_stats().hits, 0);
    }

    #[test]
    fn test_fuses_both_sources() {
        let store = Arc::new(FixedStore::new(&[("cache", ""), ("semantic_only", "fn evict_entries() {}")]));
        let searcher = searcher(Some(store as Arc<dyn VectorStore>));
        let results = searcher.search("token", "repo", &HybridSearchOptions::default());

        let semantic_only = results.iter().find(|r| r.doc_id == "semantic_only").unwrap();
        assert_eq!(semantic_only.semantic_rank, Some(2));
        assert_eq!(semantic_only.keyword_rank, None);
        assert_eq!(semantic_only.content, "fn evict_entries() {}");

        let cache = results.iter().find(|r| r.doc_id == "cache").unwrap();
        // Content comes from the keyword index when it has the document
        assert!(cache.content.contains("LruCache"));
    }

    #[test]
    fn test_boosts_recorded() {
        let searcher = searcher(None);
        let results = searcher.search("verify_token", "repo", &HybridSearchOptions::default());
        let auth = &results[0];
        let kinds: Vec<BoostKind> = auth.boosts.iter().map(|b| b.kind).collect();
        assert!(kinds.contains(&BoostKind::ExactMatch));
        assert!(kinds.contains(&BoostKind::CodeStructure));
        assert!(auth.score > auth.rrf_score);
    }

    #[test]
    fn test_empty_query_and_zero_limit() {
        let searcher = searcher(None);
        assert!(searcher.search("   ", "repo", &HybridSearchOptions::default()).is_empty());
        let opts = HybridSearchOptions {
            limit: 0,
            ..Default::default()
        };
        assert!(searcher.search("token", "repo", &opts).is_empty());
    }

    #[test]
    fn test_unknown_repo() {
        let searcher = searcher(None);
        assert!(searcher.search("token", "elsewhere", &HybridSearchOptions::default()).is_empty());
    }

    #[test]
    fn test_limit_truncates() {
        let searcher = searcher(None);
        let opts = HybridSearchOptions {
            limit: 1,
            ..Default::default()
        };
        assert_eq!(searcher.search("token", "repo", &opts).len(), 1);
    }

    #[test]
    fn test_cache_hits_skip_sources() {
        let store = Arc::new(FixedStore::new(&[("auth", "")]));
        let searcher = searcher(Some(store.clone() as Arc<dyn VectorStore>));
        let opts = HybridSearchOptions::default();

        let first = searcher.search("token", "repo", &opts);
        let second = searcher.search("token", "repo", &opts);
        assert_eq!(first, second);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(searcher.cache_stats().hits, 1);

        searcher.clear_cache();
        searcher.search("token", "repo", &opts);
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_mutation_invalidates_cache() {
        let searcher = searcher(None);
        let opts = HybridSearchOptions::default();
        assert_eq!(searcher.search("rotation", "repo", &opts).len(), 1);
        assert!(searcher.remove_document("repo", "notes"));
        assert!(searcher.search("rotation", "repo", &opts).is_empty());

        searcher
            .add_document("repo", Document::new("rotate", "fn schedule_rotation()"))
            .unwrap();
        let results = searcher.search("rotation", "repo", &opts);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "rotate");
    }

    #[test]
    fn test_diversity_drops_duplicates() {
        let searcher = HybridSearcher::new(SearchConfig::default(), None);
        searcher.add_documents(
            "repo",
            vec![
                Document::new("a", "retry request with backoff"),
                Document::new("b", "retry request with backoff"),
                Document::new("c", "retry once"),
            ],
        )
        .unwrap();
        let diverse = searcher.search("retry", "repo", &HybridSearchOptions::default());
        assert_eq!(diverse.len(), 2);

        let opts = HybridSearchOptions {
            diversify: false,
            ..Default::default()
        };
        assert_eq!(searcher.search("retry", "repo", &opts).len(), 3);
    }

    #[test]
    fn test_filters_passed_through() {
        let searcher = searcher(None);
        let opts = HybridSearchOptions {
            filters: SearchFilters {
                path_prefix: Some("docs/".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let results = searcher.search("token", "repo", &opts);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].doc_id, "notes");
    }
}
