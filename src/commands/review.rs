use super::open_searcher;
use crate::ReviewFormat;
use anyhow::{Context, Result};
use revindex::config::Config;
use revindex::llm::{LlmOptions, OpenAiCompatClient};
use revindex::retrieval::HybridSearchOptions;
use revindex::review::{ContextChunk, MultiPassReviewEngine, PrData, ProgressEvent, ReviewRequest};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Accept either a full review request or bare PR data
fn read_request(path: &Path) -> Result<ReviewRequest> {
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;

    if value.get("pr").is_some() {
        Ok(serde_json::from_value(value).context("Invalid review request")?)
    } else {
        let pr: PrData = serde_json::from_value(value).context("Invalid pull request data")?;
        Ok(ReviewRequest {
            pr,
            ..Default::default()
        })
    }
}

/// Search the repository for code related to each changed file
fn related_chunks(config: &Config, repo: &str, request: &ReviewRequest) -> Result<Vec<ContextChunk>> {
    let searcher = open_searcher(config, repo)?;
    let options = HybridSearchOptions {
        limit: config.review.max_rag_chunks_per_file,
        ..Default::default()
    };

    let mut chunks = Vec::new();
    for file in request.pr.files.iter().take(config.review.context_max_files) {
        let query = format!("{} {}", file.filename, request.pr.title);
        chunks.extend(
            searcher
                .search(&query, repo, &options)
                .iter()
                .filter_map(ContextChunk::from_result),
        );
    }
    Ok(chunks)
}

pub async fn review_pr(config: Config, pr: PathBuf, repo: Option<String>, format: ReviewFormat) -> Result<()> {
    let mut request = read_request(&pr)?;
    info!(
        "Reviewing '{}' ({} files)",
        request.pr.title,
        request.pr.files.len()
    );

    if let Some(ref repo) = repo {
        match related_chunks(&config, repo, &request) {
            Ok(chunks) => {
                info!("Attached {} related chunks from {}", chunks.len(), repo);
                request.context_chunks.extend(chunks);
            }
            Err(e) => warn!("Could not load related code from {}: {}", repo, e),
        }
    }

    let client = OpenAiCompatClient::new(&config.llm).context("Failed to initialize LLM client")?;
    let engine = MultiPassReviewEngine::new(Arc::new(client), config.review.clone()).with_progress(Arc::new(
        |event: &ProgressEvent| match event.percentage {
            Some(pct) => info!("[{:?}] {}% {}", event.phase, pct, event.message),
            None => info!("[{:?}] {}", event.phase, event.message),
        },
    ));

    let result = engine.execute(&request, &LlmOptions::default()).await?;

    match format {
        ReviewFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        ReviewFormat::Markdown => {
            println!("{}", result.analysis);
            if !result.failed_files.is_empty() {
                println!("\n> Not reviewed: {}", result.failed_files.join(", "));
            }
        }
    }
    Ok(())
}
