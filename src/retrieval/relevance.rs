//! Multi-signal relevance scoring
//!
//! Scores each result on seven normalized signals, combines them with
//! weights that always sum to 1, then applies context boosts. Works on any
//! [`Scorable`] item, so it can rerank fused hybrid results or plain
//! semantic hits.

use super::boost::looks_like_definition;
use super::hybrid::HybridResult;
use super::tokenize::{query_terms, token_set};
use crate::config::RelevanceConfig;
use crate::index::VectorHit;
use crate::types::DocumentMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// Relevance signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Semantic,
    Keyword,
    ExactMatch,
    CodeStructure,
    Recency,
    FileType,
    Popularity,
}

impl Signal {
    pub const ALL: [Signal; 7] = [
        Signal::Semantic,
        Signal::Keyword,
        Signal::ExactMatch,
        Signal::CodeStructure,
        Signal::Recency,
        Signal::FileType,
        Signal::Popularity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Keyword => "keyword",
            Self::ExactMatch => "exact_match",
            Self::CodeStructure => "code_structure",
            Self::Recency => "recency",
            Self::FileType => "file_type",
            Self::Popularity => "popularity",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }

    fn default_weight(&self) -> f32 {
        match self {
            Self::Semantic => 0.30,
            Self::Keyword => 0.25,
            Self::ExactMatch => 0.15,
            Self::CodeStructure => 0.10,
            Self::Recency => 0.05,
            Self::FileType => 0.10,
            Self::Popularity => 0.05,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type SignalMap = BTreeMap<Signal, f32>;

pub fn default_weights() -> SignalMap {
    Signal::ALL.into_iter().map(|s| (s, s.default_weight())).collect()
}

/// Coarse classification of a file path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Source,
    Test,
    Config,
    Docs,
    Other,
}

const SOURCE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "jsx", "ts", "tsx", "go", "java", "kt", "scala", "c", "h", "cc", "cpp", "hpp",
    "cs", "rb", "php", "swift", "m", "mm", "lua", "sh", "sql", "vue", "svelte", "dart", "ex", "exs",
];
const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yaml", "yml", "toml", "ini", "cfg", "conf", "xml", "env", "lock", "properties",
];
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "txt", "adoc"];
const VENDORED_DIRS: &[&str] = &["vendor", "node_modules", "dist"];

/// Whether a path looks like a test file
pub fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let basename = Path::new(&lower)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(lower.as_str())
        .to_string();

    lower.split('/').any(|seg| seg == "tests" || seg == "test" || seg == "__tests__" || seg == "spec")
        || basename.starts_with("test_")
        || basename.contains("_test.")
        || basename.contains(".test.")
        || basename.contains(".spec.")
        || basename.contains("_spec.")
}

pub fn classify_path(path: &str) -> FileKind {
    if is_test_path(path) {
        return FileKind::Test;
    }
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match extension.as_deref() {
        Some(ext) if SOURCE_EXTENSIONS.contains(&ext) => FileKind::Source,
        Some(ext) if CONFIG_EXTENSIONS.contains(&ext) => FileKind::Config,
        Some(ext) if DOC_EXTENSIONS.contains(&ext) => FileKind::Docs,
        _ => FileKind::Other,
    }
}

fn is_vendored(path: &str) -> bool {
    path.split('/').any(|seg| VENDORED_DIRS.contains(&seg))
}

fn is_test_query(query: &str) -> bool {
    let lower = query.to_lowercase();
    ["test", "spec", "mock", "assert", "fixture"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Anything the scorer can rank
pub trait Scorable {
    fn content(&self) -> &str;
    fn metadata(&self) -> &DocumentMetadata;
    /// Cosine similarity from semantic search, if it contributed
    fn semantic_similarity(&self) -> Option<f32>;
    /// Raw BM25 score, if keyword search contributed
    fn keyword_score(&self) -> Option<f32>;
}

impl Scorable for HybridResult {
    fn content(&self) -> &str {
        &self.content
    }

    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    fn semantic_similarity(&self) -> Option<f32> {
        self.semantic_score
    }

    fn keyword_score(&self) -> Option<f32> {
        self.keyword_score
    }
}

impl Scorable for VectorHit {
    fn content(&self) -> &str {
        &self.content
    }

    fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    fn semantic_similarity(&self) -> Option<f32> {
        Some(self.similarity)
    }

    fn keyword_score(&self) -> Option<f32> {
        None
    }
}

/// Caller context that boosts matching results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceContext {
    /// Language the caller is working in
    pub language: Option<String>,
    /// Component name; files whose path contains it are boosted
    pub component: Option<String>,
    /// Preferred file extensions (with or without the leading dot)
    pub preferred_file_types: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextBoostKind {
    Language,
    TestFile,
    Component,
    FileType,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextBoost {
    pub kind: ContextBoostKind,
    pub factor: f32,
}

/// How a relevance score was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Normalized signal values in [0, 1]
    pub signals: SignalMap,
    pub weights: SignalMap,
    /// `signal * weight`
    pub weighted: SignalMap,
    pub base_score: f32,
    pub boosts: Vec<ContextBoost>,
    /// Boosted score, capped at 1.0
    pub final_score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult<T> {
    pub item: T,
    pub relevance_score: f32,
    pub breakdown: ScoreBreakdown,
}

/// Weighted multi-signal scorer
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    weights: SignalMap,
    config: RelevanceConfig,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(RelevanceConfig::default())
    }
}

impl RelevanceScorer {
    pub fn new(config: RelevanceConfig) -> Self {
        let mut scorer = Self {
            weights: default_weights(),
            config,
        };
        if !scorer.config.weights.is_empty() {
            let overrides = scorer.config.weights.clone();
            scorer.set_weights_by_name(&overrides);
        }
        scorer
    }

    pub fn weights(&self) -> &SignalMap {
        &self.weights
    }

    /// Merge new weights into the current ones and re-normalize to sum to 1.
    ///
    /// Negative values are treated as 0. If everything ends up 0 the
    /// defaults are restored.
    pub fn set_weights(&mut self, updates: &SignalMap) {
        for (signal, weight) in updates {
            self.weights.insert(*signal, weight.max(0.0));
        }

        let total: f32 = self.weights.values().sum();
        if total <= 0.0 || !total.is_finite() {
            warn!("Relevance weights sum to {}, restoring defaults", total);
            self.weights = default_weights();
            return;
        }
        for weight in self.weights.values_mut() {
            *weight /= total;
        }
        debug!("Relevance weights updated: {:?}", self.weights);
    }

    /// [`set_weights`](Self::set_weights) keyed by signal name; unknown names are skipped
    pub fn set_weights_by_name(&mut self, updates: &BTreeMap<String, f32>) {
        let mut parsed = SignalMap::new();
        for (name, weight) in updates {
            match Signal::parse(name) {
                Some(signal) => {
                    parsed.insert(signal, *weight);
                }
                None => warn!("Ignoring unknown relevance signal '{}'", name),
            }
        }
        self.set_weights(&parsed);
    }

    /// Score every item and sort descending by relevance (stable on ties)
    pub fn rerank<T: Scorable>(
        &self,
        items: Vec<T>,
        query: &str,
        context: &RelevanceContext,
    ) -> Vec<ScoredResult<T>> {
        self.rerank_at(items, query, context, Utc::now())
    }

    pub fn rerank_at<T: Scorable>(
        &self,
        items: Vec<T>,
        query: &str,
        context: &RelevanceContext,
        now: DateTime<Utc>,
    ) -> Vec<ScoredResult<T>> {
        let max_keyword = items
            .iter()
            .filter_map(|i| i.keyword_score())
            .fold(0.0f32, f32::max);

        let mut scored: Vec<ScoredResult<T>> = items
            .into_iter()
            .map(|item| {
                let breakdown = self.score(&item, query, max_keyword, context, now);
                ScoredResult {
                    relevance_score: breakdown.final_score,
                    item,
                    breakdown,
                }
            })
            .collect();

        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored
    }

    /// Score a single item against `query`
    pub fn score<T: Scorable>(
        &self,
        item: &T,
        query: &str,
        max_keyword: f32,
        context: &RelevanceContext,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let metadata = item.metadata();
        let path = metadata.file_path.as_deref().unwrap_or("");
        let test_query = is_test_query(query);

        let mut signals = SignalMap::new();
        signals.insert(
            Signal::Semantic,
            item.semantic_similarity().unwrap_or(0.0).clamp(0.0, 1.0),
        );
        signals.insert(
            Signal::Keyword,
            match item.keyword_score() {
                Some(score) if max_keyword > 0.0 => (score / max_keyword).clamp(0.0, 1.0),
                _ => 0.0,
            },
        );
        signals.insert(Signal::ExactMatch, exact_match_signal(query, item.content()));
        signals.insert(
            Signal::CodeStructure,
            code_structure_signal(metadata, item.content()),
        );
        signals.insert(
            Signal::Recency,
            recency_signal(metadata.last_modified, now, self.config.recency_half_life_days),
        );
        signals.insert(Signal::FileType, file_type_signal(metadata, test_query));
        signals.insert(
            Signal::Popularity,
            metadata.popularity.unwrap_or(0.0).clamp(0.0, 1.0),
        );

        let weighted: SignalMap = signals
            .iter()
            .map(|(signal, value)| (*signal, value * self.weights.get(signal).copied().unwrap_or(0.0)))
            .collect();
        let base_score: f32 = weighted.values().sum();

        let mut boosts = Vec::new();
        if let (Some(wanted), Some(language)) = (&context.language, &metadata.language) {
            if wanted.eq_ignore_ascii_case(language) {
                boosts.push(ContextBoost {
                    kind: ContextBoostKind::Language,
                    factor: self.config.language_boost,
                });
            }
        }
        if test_query && !path.is_empty() && is_test_path(path) {
            boosts.push(ContextBoost {
                kind: ContextBoostKind::TestFile,
                factor: self.config.test_file_boost,
            });
        }
        if let Some(component) = &context.component {
            if !component.is_empty() && path.to_lowercase().contains(&component.to_lowercase()) {
                boosts.push(ContextBoost {
                    kind: ContextBoostKind::Component,
                    factor: self.config.component_boost,
                });
            }
        }
        if let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) {
            if context
                .preferred_file_types
                .iter()
                .any(|t| t.trim_start_matches('.').eq_ignore_ascii_case(ext))
            {
                boosts.push(ContextBoost {
                    kind: ContextBoostKind::FileType,
                    factor: self.config.file_type_boost,
                });
            }
        }

        let factor: f32 = boosts.iter().map(|b| b.factor).product();
        let final_score = (base_score * factor).min(1.0);

        ScoreBreakdown {
            signals,
            weights: self.weights.clone(),
            weighted,
            base_score,
            boosts,
            final_score,
        }
    }
}

fn exact_match_signal(query: &str, content: &str) -> f32 {
    let trimmed = query.trim().to_lowercase();
    if trimmed.is_empty() {
        return 0.0;
    }
    if content.to_lowercase().contains(&trimmed) {
        return 1.0;
    }
    let terms = query_terms(query);
    if terms.is_empty() {
        return 0.0;
    }
    let tokens = token_set(content);
    let present = terms.iter().filter(|t| tokens.contains(*t)).count();
    present as f32 / terms.len() as f32 * 0.5
}

fn code_structure_signal(metadata: &DocumentMetadata, content: &str) -> f32 {
    match metadata.chunk_type.as_deref().map(|t| t.to_lowercase()) {
        Some(t) => match t.as_str() {
            "function" | "method" | "fn" => 1.0,
            "class" | "struct" | "interface" | "trait" | "enum" => 0.9,
            "module" | "mod" | "namespace" => 0.6,
            _ => 0.5,
        },
        None if metadata.symbol_name.is_some() || looks_like_definition(content) => 0.5,
        None => 0.2,
    }
}

fn recency_signal(last_modified: Option<DateTime<Utc>>, now: DateTime<Utc>, half_life_days: f32) -> f32 {
    let Some(modified) = last_modified else {
        return 0.5;
    };
    let age_days = ((now - modified).num_seconds().max(0) as f32) / 86_400.0;
    0.5f32.powf(age_days / half_life_days.max(f32::EPSILON))
}

fn file_type_signal(metadata: &DocumentMetadata, test_query: bool) -> f32 {
    let Some(path) = metadata.file_path.as_deref() else {
        return if metadata.language.is_some() { 1.0 } else { 0.3 };
    };

    let base = match classify_path(path) {
        FileKind::Source => 1.0,
        FileKind::Test if test_query => 1.0,
        FileKind::Test => 0.7,
        FileKind::Config => 0.5,
        FileKind::Docs => 0.4,
        FileKind::Other => 0.3,
    };
    if is_vendored(path) {
        base * 0.3
    } else {
        base
    }
}
