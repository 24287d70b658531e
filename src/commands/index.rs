use super::{load_documents, open_vector_store, save_documents};
use anyhow::{Context, Result};
use revindex::config::Config;
use revindex::types::{Document, DocumentMetadata, Embedding};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// One line of the chunk file
#[derive(Debug, Deserialize)]
struct ChunkRecord {
    doc_id: String,
    content: String,
    #[serde(default)]
    metadata: DocumentMetadata,
    #[serde(default)]
    embedding: Option<Embedding>,
}

fn read_chunks(path: &Path) -> Result<Vec<ChunkRecord>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ChunkRecord>(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping line {} of {}: {}", line_no + 1, path.display(), e),
        }
    }
    Ok(records)
}

pub fn index_chunks(config: Config, repo: String, chunks: PathBuf) -> Result<()> {
    let start = Instant::now();
    let records = read_chunks(&chunks)?;
    if records.is_empty() {
        anyhow::bail!("No chunks found in {}", chunks.display());
    }
    info!("Indexing {} chunks into {}", records.len(), repo);

    let existing = load_documents(&config, &repo)?;
    let vector_store = open_vector_store(&config)?;
    vector_store.load_repo(&repo, existing.clone())?;

    let batch: Vec<(Document, Option<Embedding>)> = records
        .into_iter()
        .map(|r| {
            let document = Document {
                doc_id: r.doc_id,
                content: r.content,
                metadata: r.metadata,
            };
            (document, r.embedding)
        })
        .collect();

    let mut merged: BTreeMap<String, Document> = existing.into_iter().map(|d| (d.doc_id.clone(), d)).collect();
    for (document, _) in &batch {
        merged.insert(document.doc_id.clone(), document.clone());
    }

    let indexed = vector_store.index_documents(&repo, batch)?;
    vector_store.save_repo(&repo)?;

    let documents: Vec<Document> = merged.into_values().collect();
    save_documents(&config, &repo, &documents)?;

    info!(
        "Indexed {} chunks in {:.2}s ({} documents in {})",
        indexed,
        start.elapsed().as_secs_f64(),
        documents.len(),
        repo
    );
    println!("Indexed {} chunks into '{}' ({} total)", indexed, repo, documents.len());
    Ok(())
}
