//! On-disk storage configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where persisted indices and documents live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory for persistence
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".revindex"),
        }
    }
}

impl StorageConfig {
    /// Path of the sled database holding HNSW snapshots
    pub fn hnsw_db_path(&self) -> PathBuf {
        self.data_dir.join("hnsw.sled")
    }

    /// Path of the JSON file holding a repository's keyword documents
    pub fn documents_path(&self, repo_id: &str) -> PathBuf {
        let safe: String = repo_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.data_dir.join("documents").join(format!("{}.json", safe))
    }
}
