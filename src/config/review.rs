//! Multi-pass review configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Review pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Maximum number of changed files considered for review
    pub max_files_to_review: usize,
    /// Maximum in-flight per-unit LLM calls
    pub max_concurrent: usize,
    /// Timeout for a single per-unit LLM call in seconds
    pub task_timeout_secs: u64,
    /// Retries after a failed or timed-out per-unit call
    pub max_retries: usize,
    /// Delay before a retry in milliseconds
    pub retry_delay_ms: u64,
    /// Keepalive ping interval in seconds
    pub keepalive_interval_secs: u64,
    /// PR description characters kept in the context summary
    pub description_max_chars: usize,
    /// Files listed in the context summary
    pub context_max_files: usize,
    /// Retrieved context chunks attached to each file
    pub max_rag_chunks_per_file: usize,
    /// Patch characters sent per file in a per-unit prompt
    pub max_patch_chars: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_files_to_review: 50,
            max_concurrent: 3,
            task_timeout_secs: 120,
            max_retries: 1,
            retry_delay_ms: 2000,
            keepalive_interval_secs: 25,
            description_max_chars: 300,
            context_max_files: 30,
            max_rag_chunks_per_file: 3,
            max_patch_chars: 12_000,
        }
    }
}

impl ReviewConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}
