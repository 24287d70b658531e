//! Integration tests for revindex
//!
//! These tests exercise the index, retrieval and review layers together.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use revindex::{
    config::{IndexConfig, RelevanceConfig, ReviewConfig, SearchConfig},
    embedding::{EmbeddingBackend, EmbeddingResult},
    index::{cosine_distance, HnswIndex, HnswParams, HnswStore, HnswVectorStore, SledHnswStore, VectorStore},
    llm::{ChatMessage, ChatResponse, LlmClient, LlmError, LlmOptions},
    retrieval::{
        reciprocal_rank_fusion, HybridSearchOptions, HybridSearcher, RankedResult, RelevanceContext,
        RelevanceScorer, RetrievalMethod, RrfConfig, Signal, SignalMap, WeightedList,
    },
    review::{
        prompt::AGGREGATION_SYSTEM_PROMPT, ContextChunk, Finding, MultiPassReviewEngine, PrData, PrFile,
        ReviewRequest, Severity,
    },
    types::{Document, Embedding},
};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create deterministic test embeddings from a hash of the text
fn create_test_embedding(text: &str, dims: usize) -> Vec<f32> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = hasher.finalize();

    let mut embedding = Vec::with_capacity(dims);
    for i in 0..dims {
        let byte_idx = i % hash.len();
        let value = (hash[byte_idx] as f32 / 255.0) * 2.0 - 1.0;
        embedding.push(value);
    }
    embedding
}

fn random_vectors(count: usize, dims: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn brute_force_nearest(vectors: &[Vec<f32>], query: &[f32]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (i, v) in vectors.iter().enumerate() {
        let d = cosine_distance(query, v);
        if d < best_distance {
            best_distance = d;
            best = i;
        }
    }
    best
}

#[test]
fn test_hnsw_recall_on_random_vectors() {
    let dims = 128;
    let vectors = random_vectors(1000, dims, 7);
    let mut index = HnswIndex::with_seed(HnswParams::new(16, 100, 64), 42);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(format!("v{}", i), v.clone());
    }
    assert!(index.is_connected());

    let queries = random_vectors(100, dims, 99);
    let found = queries
        .iter()
        .filter(|q| {
            let truth = format!("v{}", brute_force_nearest(&vectors, q));
            index.search(q, 10).iter().any(|hit| hit.id == truth)
        })
        .count();

    assert!(found >= 90, "recall too low: {}/100", found);
}

#[test]
fn test_snapshot_survives_sled_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("hnsw.sled");

    let vectors = random_vectors(300, 32, 3);
    let mut index = HnswIndex::with_seed(HnswParams::new(8, 64, 32), 5);
    for (i, v) in vectors.iter().enumerate() {
        index.insert(format!("doc-{}", i), v.clone());
    }
    index.remove("doc-17");

    {
        let store = SledHnswStore::open(&db_path).unwrap();
        store.save("acme/api", &index).unwrap();
        store.flush().unwrap();
    }

    let store = SledHnswStore::open(&db_path).unwrap();
    let restored = store.load("acme/api").unwrap().expect("snapshot present");
    assert_eq!(restored.len(), index.len());
    assert_eq!(restored.entry_point(), index.entry_point());
    assert!(restored.is_connected());

    for query in random_vectors(20, 32, 11) {
        let original: Vec<String> = index.search(&query, 10).into_iter().map(|h| h.id).collect();
        let reloaded: Vec<String> = restored.search(&query, 10).into_iter().map(|h| h.id).collect();
        assert_eq!(original, reloaded);
        assert!(!reloaded.contains(&"doc-17".to_string()));
    }
}

/// Counts occurrences of a handful of code words
#[derive(Debug)]
struct KeywordCountBackend;

const VOCAB: [&str; 8] = ["parse", "config", "http", "request", "cache", "token", "user", "test"];

impl EmbeddingBackend for KeywordCountBackend {
    fn embed(&self, text: &str) -> EmbeddingResult<Embedding> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB.iter().map(|w| lower.matches(w).count() as f32).collect();
        // Small hash component keeps unrelated chunks distinguishable
        v.extend(create_test_embedding(text, 4).into_iter().map(|x| x * 0.01));
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        VOCAB.len() + 4
    }

    fn name(&self) -> &str {
        "keyword-count"
    }
}

fn code_corpus() -> Vec<Document> {
    vec![
        Document::new(
            "c1",
            "pub fn parse_config(path: &Path) -> Result<Config> {\n    let text = read(path)?;\n    toml::from_str(&text)\n}",
        )
        .with_path("src/config.rs")
        .with_language("rust")
        .with_chunk_type("function"),
        Document::new(
            "c2",
            "pub async fn send_request(client: &Client, req: Request) -> Response {\n    client.execute(req).await\n}",
        )
        .with_path("src/http/client.rs")
        .with_language("rust")
        .with_chunk_type("function"),
        Document::new(
            "c3",
            "#[test]\nfn test_parse_config_defaults() {\n    let config = parse_config(Path::new(\"x.toml\")).unwrap();\n}",
        )
        .with_path("tests/config_test.rs")
        .with_language("rust"),
        Document::new(
            "c4",
            "struct TokenCache {\n    tokens: HashMap<UserId, Token>,\n}",
        )
        .with_path("src/auth/cache.rs")
        .with_language("rust")
        .with_chunk_type("struct"),
        Document::new("c5", "def parse_config(path):\n    return yaml.safe_load(open(path))")
            .with_path("scripts/config.py")
            .with_language("python"),
    ]
}

fn build_searcher(repo: &str) -> (HybridSearcher, Arc<HnswVectorStore>) {
    let vector_store = Arc::new(HnswVectorStore::new(IndexConfig::default(), Arc::new(KeywordCountBackend)));
    let corpus = code_corpus();
    vector_store
        .index_documents(repo, corpus.iter().cloned().map(|d| (d, None)).collect())
        .unwrap();

    let searcher = HybridSearcher::new(
        SearchConfig::default(),
        Some(vector_store.clone() as Arc<dyn VectorStore>),
    );
    searcher.add_documents(repo, corpus).unwrap();
    (searcher, vector_store)
}

#[test]
fn test_hybrid_search_and_rerank_pipeline() {
    let (searcher, vector_store) = build_searcher("acme/api");
    assert_eq!(vector_store.len("acme/api"), 5);

    let results = searcher.search("parse config", "acme/api", &HybridSearchOptions::default());
    assert!(!results.is_empty());
    let top_ids: Vec<&str> = results.iter().take(3).map(|r| r.doc_id.as_str()).collect();
    assert!(top_ids.contains(&"c1"));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));

    let c1 = results.iter().find(|r| r.doc_id == "c1").unwrap();
    assert!(c1.keyword_rank.is_some());
    assert!(c1.semantic_rank.is_some());

    let scorer = RelevanceScorer::new(RelevanceConfig::default());
    let context = RelevanceContext {
        language: Some("rust".to_string()),
        ..Default::default()
    };
    let ranked = scorer.rerank(results, "parse config", &context);
    assert!(ranked
        .iter()
        .all(|r| (0.0..=1.0).contains(&r.relevance_score)));
    assert!(ranked.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
    // The python chunk does not get the language boost
    let py = ranked.iter().find(|r| r.item.doc_id == "c5");
    let rs = ranked.iter().find(|r| r.item.doc_id == "c1");
    if let (Some(py), Some(rs)) = (py, rs) {
        assert!(rs.breakdown.boosts.len() > py.breakdown.boosts.len());
    }
}

#[test]
fn test_search_filters_and_cache() {
    let (searcher, _) = build_searcher("acme/api");
    let options = HybridSearchOptions {
        filters: revindex::types::SearchFilters {
            path_prefix: Some("src/".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    let first = searcher.search("parse config", "acme/api", &options);
    assert!(first
        .iter()
        .all(|r| r.metadata.file_path.as_deref().unwrap_or("").starts_with("src/")));

    let second = searcher.search("parse config", "acme/api", &options);
    assert_eq!(first, second);
    assert_eq!(searcher.cache_stats().hits, 1);

    // Mutations invalidate cached results; c1 can still arrive from the vector store
    assert!(searcher.remove_document("acme/api", "c1"));
    let third = searcher.search("parse config", "acme/api", &options);
    assert!(third
        .iter()
        .filter(|r| r.doc_id == "c1")
        .all(|r| r.keyword_rank.is_none()));
}

#[test]
fn test_unknown_repo_returns_nothing() {
    let (searcher, _) = build_searcher("acme/api");
    assert!(searcher
        .search("parse config", "other/repo", &HybridSearchOptions::default())
        .is_empty());
    assert!(searcher.search("   ", "acme/api", &HybridSearchOptions::default()).is_empty());
}

#[test]
fn test_rrf_agreement_beats_single_list() {
    let ranked = |ids: &[&str]| -> Vec<RankedResult> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| RankedResult {
                doc_id: id.to_string(),
                rank: i + 1,
                original_score: 1.0 / (i + 1) as f32,
            })
            .collect()
    };

    let fused = reciprocal_rank_fusion(
        &[
            WeightedList {
                method: RetrievalMethod::Keyword,
                weight: 0.5,
                results: ranked(&["both", "kw-only"]),
            },
            WeightedList {
                method: RetrievalMethod::Semantic,
                weight: 0.5,
                results: ranked(&["both", "sem-only"]),
            },
        ],
        &RrfConfig { k: 60 },
    );

    assert_eq!(fused[0].doc_id, "both");
    let others: Vec<f32> = fused[1..].iter().map(|f| f.rrf_score).collect();
    assert!(others.iter().all(|s| fused[0].rrf_score > *s));
}

#[test]
fn test_relevance_weights_always_normalized() {
    let mut scorer = RelevanceScorer::default();
    let updates: Vec<SignalMap> = vec![
        [(Signal::Semantic, 5.0)].into_iter().collect(),
        [(Signal::Keyword, 0.0), (Signal::Recency, 2.5)].into_iter().collect(),
        Signal::ALL.iter().map(|s| (*s, 0.0)).collect(),
    ];
    for update in updates {
        scorer.set_weights(&update);
        let sum: f32 = scorer.weights().values().sum();
        assert!((sum - 1.0).abs() < 1e-5, "weights sum to {}", sum);
    }
}

/// Records every prompt and replies with a fixed JSON review
struct RecordingLlm {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn stream_chat(&self, messages: &[ChatMessage], _options: &LlmOptions) -> Result<ChatResponse, LlmError> {
        if messages[0].content == AGGREGATION_SYSTEM_PROMPT {
            return Ok(ChatResponse {
                content: "## Verdict: NEEDS_CHANGES\n\nRisk: HIGH".to_string(),
            });
        }
        self.prompts.lock().push(messages[1].content.clone());
        Ok(ChatResponse {
            content: "```json\n{\"fileVerdict\":\"NEEDS_CHANGES\",\"riskLevel\":\"HIGH\",\"findings\":[{\"severity\":\"high\",\"title\":\"Unchecked unwrap\",\"confidence\":0.8}]}\n```".to_string(),
        })
    }
}

#[tokio::test]
async fn test_review_pipeline_with_context() {
    let (searcher, _) = build_searcher("acme/api");
    let related: Vec<ContextChunk> = searcher
        .search("config parse", "acme/api", &HybridSearchOptions::default())
        .iter()
        .filter_map(ContextChunk::from_result)
        .collect();
    assert!(!related.is_empty());

    let request = ReviewRequest {
        pr: PrData {
            title: "Support TOML includes".to_string(),
            description: Some("Adds include directives to config files".to_string()),
            base_branch: Some("main".to_string()),
            head_branch: Some("toml-includes".to_string()),
            files: vec![
                PrFile::new("src/config.rs", 40, 4).with_patch("+    let included = resolve_includes(&text)?;"),
                PrFile::new("tests/config_test.rs", 25, 0),
                PrFile::new("README.md", 3, 0),
            ],
            ..Default::default()
        },
        static_findings: vec![Finding::new(Severity::Medium, "Possible path traversal").in_file("src/config.rs")],
        context_chunks: related,
    };

    let llm = Arc::new(RecordingLlm {
        prompts: Mutex::new(Vec::new()),
    });
    let engine = MultiPassReviewEngine::new(llm.clone(), ReviewConfig::default());
    let result = engine.execute(&request, &LlmOptions::default()).await.unwrap();

    // Source and test reviewed together, README alone
    assert_eq!(result.review_units, 2);
    assert!(result.failed_files.is_empty());
    assert_eq!(result.per_file_findings.len(), 2);
    assert_eq!(result.total_findings(), 2);
    assert!(result.analysis.starts_with("## Verdict"));

    let prompts = llm.prompts.lock();
    let config_prompt = prompts
        .iter()
        .find(|p| p.contains("## Primary file: src/config.rs"))
        .expect("prompt for src/config.rs");
    assert!(config_prompt.contains("### File: tests/config_test.rs"));
    assert!(config_prompt.contains("Possible path traversal"));
    assert!(config_prompt.contains("## Related code"));
    assert!(config_prompt.contains("resolve_includes"));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["isMultiPass"], true);
    assert_eq!(json["perFileFindings"].as_array().unwrap().len(), 2);
}
