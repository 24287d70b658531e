//! Index, search, and relevance configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// HNSW M parameter (max connections per node above layer 0)
    pub hnsw_m: usize,
    /// HNSW ef_construction parameter
    pub hnsw_ef_construction: usize,
    /// HNSW ef_search parameter
    pub hnsw_ef_search: usize,
    /// Seed for level sampling, so rebuilt graphs are reproducible
    pub seed: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            hnsw_m: 16,
            hnsw_ef_construction: 200,
            hnsw_ef_search: 50,
            seed: 0x5eed_1dec,
        }
    }
}

/// Hybrid search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// RRF k parameter
    pub rrf_k: usize,
    /// Weight of the keyword ranking in fusion
    pub keyword_weight: f32,
    /// Weight of the semantic ranking in fusion
    pub semantic_weight: f32,
    /// Candidates fetched from each source before fusion
    pub expanded_limit: usize,
    /// Results returned when the caller does not specify a limit
    pub default_limit: usize,
    /// Boost when the whole query appears verbatim in the content
    pub exact_match_boost: f32,
    /// Boost when a query term appears in the file name
    pub file_name_boost: f32,
    /// Boost for chunks that look like definitions
    pub code_structure_boost: f32,
    /// Boost for files modified recently
    pub recency_boost: f32,
    /// Window for the recency boost in days
    pub recency_window_days: i64,
    /// Near-duplicate threshold (token-set Jaccard) for the diversity filter
    pub diversity_radius: f32,
    /// Enable the diversity filter
    pub enable_diversity: bool,
    /// Maximum number of cached queries
    pub cache_size: usize,
    /// Cache entry lifetime in seconds
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60,
            keyword_weight: 0.4,
            semantic_weight: 0.6,
            expanded_limit: 50,
            default_limit: 10,
            exact_match_boost: 1.5,
            file_name_boost: 1.3,
            code_structure_boost: 1.2,
            recency_boost: 1.1,
            recency_window_days: 7,
            diversity_radius: 0.85,
            enable_diversity: true,
            cache_size: 100,
            cache_ttl_secs: 300,
        }
    }
}

/// Relevance scorer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceConfig {
    /// Initial signal weights; normalized to sum to 1 when loaded
    pub weights: BTreeMap<String, f32>,
    /// Half-life of the recency signal in days
    pub recency_half_life_days: f32,
    pub language_boost: f32,
    pub test_file_boost: f32,
    pub component_boost: f32,
    pub file_type_boost: f32,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            weights: BTreeMap::new(),
            recency_half_life_days: 30.0,
            language_boost: 1.2,
            test_file_boost: 1.3,
            component_boost: 1.25,
            file_type_boost: 1.15,
        }
    }
}
