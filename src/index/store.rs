//! Persistence for HNSW indices
//!
//! Each repository's graph is stored as a JSON snapshot keyed by repo id.

use super::hnsw::{HnswIndex, HnswSnapshot};
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Save/load collaborator for repository indices
pub trait HnswStore: Send + Sync {
    fn save(&self, repo_id: &str, index: &HnswIndex) -> Result<()>;

    /// Load a repository's index, `None` if it was never saved
    fn load(&self, repo_id: &str) -> Result<Option<HnswIndex>>;

    fn delete(&self, repo_id: &str) -> Result<()>;

    /// Repository ids with a stored index
    fn repos(&self) -> Result<Vec<String>>;
}

/// HNSW snapshots in a sled tree
pub struct SledHnswStore {
    db: sled::Db,
    indices: sled::Tree,
}

impl SledHnswStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open HNSW database at {:?}", path))?;
        let indices = db
            .open_tree("hnsw_indices")
            .context("Failed to open HNSW index tree")?;
        Ok(Self { db, indices })
    }

    /// Flush sled buffers
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush HNSW database")?;
        Ok(())
    }
}

impl HnswStore for SledHnswStore {
    fn save(&self, repo_id: &str, index: &HnswIndex) -> Result<()> {
        let data = serde_json::to_vec(&index.to_snapshot())
            .with_context(|| format!("Failed to serialize HNSW index for {}", repo_id))?;
        self.indices
            .insert(repo_id.as_bytes(), data)
            .with_context(|| format!("Failed to store HNSW index for {}", repo_id))?;
        self.flush()?;
        debug!("Saved HNSW index for {} ({} nodes)", repo_id, index.len());
        Ok(())
    }

    fn load(&self, repo_id: &str) -> Result<Option<HnswIndex>> {
        let Some(data) = self
            .indices
            .get(repo_id.as_bytes())
            .with_context(|| format!("Failed to read HNSW index for {}", repo_id))?
        else {
            return Ok(None);
        };

        let snapshot: HnswSnapshot = serde_json::from_slice(&data)
            .with_context(|| format!("Corrupt HNSW snapshot for {}", repo_id))?;
        Ok(Some(HnswIndex::from_snapshot(snapshot)))
    }

    fn delete(&self, repo_id: &str) -> Result<()> {
        if let Err(e) = self.indices.remove(repo_id.as_bytes()) {
            warn!("Failed to remove HNSW index for {}: {}", repo_id, e);
            return Err(e.into());
        }
        self.flush()
    }

    fn repos(&self) -> Result<Vec<String>> {
        Ok(self
            .indices
            .iter()
            .keys()
            .filter_map(|r| r.ok())
            .filter_map(|k| String::from_utf8(k.to_vec()).ok())
            .collect())
    }
}

/// Process-local store, mainly for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryHnswStore {
    snapshots: RwLock<HashMap<String, HnswSnapshot>>,
}

impl MemoryHnswStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HnswStore for MemoryHnswStore {
    fn save(&self, repo_id: &str, index: &HnswIndex) -> Result<()> {
        self.snapshots
            .write()
            .insert(repo_id.to_string(), index.to_snapshot());
        Ok(())
    }

    fn load(&self, repo_id: &str) -> Result<Option<HnswIndex>> {
        Ok(self
            .snapshots
            .read()
            .get(repo_id)
            .cloned()
            .map(HnswIndex::from_snapshot))
    }

    fn delete(&self, repo_id: &str) -> Result<()> {
        self.snapshots.write().remove(repo_id);
        Ok(())
    }

    fn repos(&self) -> Result<Vec<String>> {
        Ok(self.snapshots.read().keys().cloned().collect())
    }
}
