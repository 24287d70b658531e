//! Configuration for revindex

mod embedding;
mod index;
mod llm;
mod logging;
mod review;
mod storage;

pub use embedding::EmbeddingConfig;
pub use index::{IndexConfig, RelevanceConfig, SearchConfig};
pub use llm::LlmConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use review::ReviewConfig;
pub use storage::StorageConfig;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Storage locations
    #[serde(default)]
    pub storage: StorageConfig,
    /// Vector index configuration
    #[serde(default)]
    pub index: IndexConfig,
    /// Hybrid search configuration
    #[serde(default)]
    pub search: SearchConfig,
    /// Relevance scorer configuration
    #[serde(default)]
    pub relevance: RelevanceConfig,
    /// Review pipeline configuration
    #[serde(default)]
    pub review: ReviewConfig,
    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// LLM collaborator configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML (used by `revindex init`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Index validation
        if self.index.hnsw_m < 2 {
            errors.push("HNSW M parameter must be at least 2".to_string());
        }
        if self.index.hnsw_ef_construction == 0 {
            errors.push("ef_construction must be positive".to_string());
        }
        if self.index.hnsw_ef_search == 0 {
            errors.push("ef_search must be positive".to_string());
        }

        // Search validation
        let s = &self.search;
        if s.rrf_k == 0 {
            errors.push("rrf_k must be positive".to_string());
        }
        if s.keyword_weight < 0.0 || s.semantic_weight < 0.0 {
            errors.push("fusion weights must be non-negative".to_string());
        }
        if s.keyword_weight + s.semantic_weight <= 0.0 {
            errors.push("at least one fusion weight must be positive".to_string());
        }
        if s.expanded_limit == 0 {
            errors.push("expanded_limit must be positive".to_string());
        }
        if s.diversity_radius <= 0.0 || s.diversity_radius > 1.0 {
            errors.push("diversity_radius must be between 0.0 (exclusive) and 1.0".to_string());
        }
        for (name, boost) in [
            ("exact_match_boost", s.exact_match_boost),
            ("file_name_boost", s.file_name_boost),
            ("code_structure_boost", s.code_structure_boost),
            ("recency_boost", s.recency_boost),
        ] {
            if boost <= 0.0 {
                errors.push(format!("{} must be positive", name));
            }
        }

        // Relevance validation
        for (name, weight) in &self.relevance.weights {
            if *weight < 0.0 {
                errors.push(format!("relevance weight '{}' must be non-negative", name));
            }
        }
        if self.relevance.recency_half_life_days <= 0.0 {
            errors.push("recency_half_life_days must be positive".to_string());
        }

        // Review validation
        let r = &self.review;
        if r.max_concurrent == 0 {
            errors.push("max_concurrent must be at least 1".to_string());
        }
        if r.max_files_to_review == 0 {
            errors.push("max_files_to_review must be positive".to_string());
        }
        if r.task_timeout_secs == 0 {
            errors.push("task_timeout_secs must be positive".to_string());
        }
        if r.keepalive_interval_secs == 0 {
            errors.push("keepalive_interval_secs must be positive".to_string());
        }

        // Embedding validation
        if self.embedding.dimensions == 0 {
            errors.push("embedding dimensions must be positive".to_string());
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
