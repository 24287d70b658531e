//! Multiplicative post-fusion boosts

use crate::config::SearchConfig;
use crate::types::DocumentMetadata;
use chrono::{DateTime, Duration, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

static RE_DEFINITION: OnceLock<Option<Regex>> = OnceLock::new();

fn definition_regex() -> Option<&'static Regex> {
    RE_DEFINITION
        .get_or_init(|| {
            Regex::new(
                r"(?m)^\s*(export\s+)?(pub(\([^)]*\))?\s+)?(async\s+)?(fn|def|class|struct|enum|trait|impl|interface|function|func|type)\s+\w+",
            )
            .ok()
        })
        .as_ref()
}

/// Whether the text contains a class/function/type definition
pub fn looks_like_definition(content: &str) -> bool {
    definition_regex().is_some_and(|re| re.is_match(content))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    ExactMatch,
    FileName,
    CodeStructure,
    Recency,
}

impl fmt::Display for BoostKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExactMatch => "exact_match",
            Self::FileName => "file_name",
            Self::CodeStructure => "code_structure",
            Self::Recency => "recency",
        };
        f.write_str(name)
    }
}

/// A boost applied to one result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedBoost {
    pub kind: BoostKind,
    pub factor: f32,
}

/// Boost factors
#[derive(Debug, Clone)]
pub struct BoostConfig {
    pub exact_match: f32,
    pub file_name: f32,
    pub code_structure: f32,
    pub recency: f32,
    pub recency_window: Duration,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default())
    }
}

impl BoostConfig {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            exact_match: config.exact_match_boost,
            file_name: config.file_name_boost,
            code_structure: config.code_structure_boost,
            recency: config.recency_boost,
            recency_window: Duration::days(config.recency_window_days),
        }
    }
}

/// Compute the boosts that apply to one candidate.
///
/// `terms` are the tokenized query terms.
pub fn compute_boosts(
    query: &str,
    terms: &[String],
    content: &str,
    metadata: &DocumentMetadata,
    now: DateTime<Utc>,
    config: &BoostConfig,
) -> Vec<AppliedBoost> {
    let mut boosts = Vec::new();

    let trimmed = query.trim();
    if !trimmed.is_empty() && content.to_lowercase().contains(&trimmed.to_lowercase()) {
        boosts.push(AppliedBoost {
            kind: BoostKind::ExactMatch,
            factor: config.exact_match,
        });
    }

    if let Some(basename) = metadata.basename() {
        let basename = basename.to_lowercase();
        if terms.iter().any(|t| basename.contains(t.as_str())) {
            boosts.push(AppliedBoost {
                kind: BoostKind::FileName,
                factor: config.file_name,
            });
        }
    }

    if metadata.has_structure() || looks_like_definition(content) {
        boosts.push(AppliedBoost {
            kind: BoostKind::CodeStructure,
            factor: config.code_structure,
        });
    }

    if let Some(modified) = metadata.last_modified {
        if modified <= now && now - modified <= config.recency_window {
            boosts.push(AppliedBoost {
                kind: BoostKind::Recency,
                factor: config.recency,
            });
        }
    }

    boosts
}

/// Product of all boost factors (1.0 when none apply)
pub fn combined_factor(boosts: &[AppliedBoost]) -> f32 {
    boosts.iter().map(|b| b.factor).product()
}
