use super::open_searcher;
use crate::OutputFormat;
use anyhow::Result;
use revindex::config::Config;
use revindex::retrieval::{HybridResult, HybridSearchOptions, RelevanceContext, RelevanceScorer, ScoredResult};
use revindex::types::SearchFilters;
use revindex::util::truncate_str;
use tracing::info;

pub fn search_repo(
    config: Config,
    repo: String,
    query: String,
    limit: usize,
    path_prefix: Option<String>,
    language: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    info!("Searching {} for: {}", repo, query);

    let searcher = open_searcher(&config, &repo)?;
    let options = HybridSearchOptions {
        limit,
        filters: SearchFilters {
            path_prefix,
            ..Default::default()
        },
        ..Default::default()
    };
    let results = searcher.search(&query, &repo, &options);

    let scorer = RelevanceScorer::new(config.relevance.clone());
    let context = RelevanceContext {
        language,
        ..Default::default()
    };
    let ranked = scorer.rerank(results, &query, &context);

    output_results(&ranked, format)
}

fn output_results(results: &[ScoredResult<HybridResult>], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results)?);
        }
        OutputFormat::Text => {
            println!("\nSearch Results ({}):\n", results.len());
            for (i, result) in results.iter().enumerate() {
                let item = &result.item;
                println!(
                    "[{}] [Relevance: {:.3}] [Fused: {:.4}] {}",
                    i + 1,
                    result.relevance_score,
                    item.score,
                    item.metadata.file_path.as_deref().unwrap_or(&item.doc_id),
                );
                if let Some(ref symbol) = item.metadata.symbol_name {
                    println!("   Symbol: {}", symbol);
                }
                let preview = truncate_str(item.content.trim(), 200).replace('\n', " ");
                println!("   {}\n", preview);
            }
        }
    }
    Ok(())
}
