//! Result fusion
//!
//! Weighted Reciprocal Rank Fusion for combining keyword and semantic
//! rankings

use crate::types::DocId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Source of a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMethod {
    Keyword,
    Semantic,
}

impl fmt::Display for RetrievalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keyword => write!(f, "keyword"),
            Self::Semantic => write!(f, "semantic"),
        }
    }
}

/// RRF parameters
#[derive(Debug, Clone)]
pub struct RrfConfig {
    /// Rank offset (default: 60)
    pub k: usize,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

/// A result at a 1-based rank in one source list
#[derive(Debug, Clone)]
pub struct RankedResult {
    pub doc_id: DocId,
    pub rank: usize,
    pub original_score: f32,
}

/// One source list and the weight its contributions carry
#[derive(Debug, Clone)]
pub struct WeightedList {
    pub method: RetrievalMethod,
    pub weight: f32,
    pub results: Vec<RankedResult>,
}

/// Fused result after combining all source lists
#[derive(Debug, Clone)]
pub struct FusedResult {
    pub doc_id: DocId,
    pub rrf_score: f32,
    pub rank_per_method: HashMap<RetrievalMethod, usize>,
    pub score_per_method: HashMap<RetrievalMethod, f32>,
}

impl FusedResult {
    pub fn rank(&self, method: RetrievalMethod) -> Option<usize> {
        self.rank_per_method.get(&method).copied()
    }

    pub fn score(&self, method: RetrievalMethod) -> Option<f32> {
        self.score_per_method.get(&method).copied()
    }
}

/// Contribution of a single ranked appearance: `weight / (k + rank)`
pub fn rrf_contribution(weight: f32, k: usize, rank: usize) -> f32 {
    weight / (k as f32 + rank as f32)
}

/// Weighted Reciprocal Rank Fusion
///
/// `score(d) = Σ weight_r / (k + rank_r(d))` over the lists containing `d`;
/// a list that does not contain `d` contributes nothing. Works on ranks so
/// BM25 scores and cosine similarities need no calibration against each
/// other. Sorted by fused score descending, ties by id.
pub fn reciprocal_rank_fusion(lists: &[WeightedList], config: &RrfConfig) -> Vec<FusedResult> {
    let mut fused: HashMap<DocId, FusedResult> = HashMap::new();

    for list in lists {
        for result in &list.results {
            let contribution = rrf_contribution(list.weight, config.k, result.rank);
            let entry = fused
                .entry(result.doc_id.clone())
                .or_insert_with(|| FusedResult {
                    doc_id: result.doc_id.clone(),
                    rrf_score: 0.0,
                    rank_per_method: HashMap::new(),
                    score_per_method: HashMap::new(),
                });

            // A duplicate within one list keeps its best rank only
            if let Some(&existing) = entry.rank_per_method.get(&list.method) {
                if existing <= result.rank {
                    continue;
                }
                entry.rrf_score -= rrf_contribution(list.weight, config.k, existing);
            }
            entry.rrf_score += contribution;
            entry.rank_per_method.insert(list.method, result.rank);
            entry.score_per_method.insert(list.method, result.original_score);
        }
    }

    let mut results: Vec<FusedResult> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.rrf_score
            .total_cmp(&a.rrf_score)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    results
}

/// Convert scored results (already sorted best-first) to 1-based ranks
pub fn to_ranked_results(results: &[(DocId, f32)]) -> Vec<RankedResult> {
    results
        .iter()
        .enumerate()
        .map(|(rank, (doc_id, score))| RankedResult {
            doc_id: doc_id.clone(),
            rank: rank + 1,
            original_score: *score,
        })
        .collect()
}
