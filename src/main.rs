//! revindex: hybrid code search and multi-pass pull request review

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use revindex::config::{Config, LogFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "revindex")]
#[command(about = "Hybrid code search and multi-pass LLM pull request review")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Data directory (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Index code chunks for a repository from a JSONL file
    Index {
        /// Repository identifier
        repo: String,

        /// JSONL file, one chunk per line
        chunks: PathBuf,
    },

    /// Search an indexed repository
    Search {
        /// Repository identifier
        repo: String,

        /// Search query
        query: String,

        /// Number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Restrict to files under this path prefix
        #[arg(long)]
        path_prefix: Option<String>,

        /// Language the results should favor
        #[arg(long)]
        language: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run a multi-pass review over a pull request JSON file
    Review {
        /// Pull request JSON (a review request or bare PR data)
        pr: PathBuf,

        /// Attach related code from this indexed repository
        #[arg(long)]
        repo: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ReviewFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReviewFormat {
    Markdown,
    Json,
}

fn init_logging(config: &Config, verbose: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.filter_directive(verbose)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load or create config
    let mut config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Init { path } => commands::init::init_config(path),
        Commands::Index { repo, chunks } => {
            ensure_data_dir(&config)?;
            commands::index::index_chunks(config, repo, chunks)
        }
        Commands::Search {
            repo,
            query,
            limit,
            path_prefix,
            language,
            format,
        } => {
            ensure_data_dir(&config)?;
            commands::search::search_repo(config, repo, query, limit, path_prefix, language, format)
        }
        Commands::Review { pr, repo, format } => {
            ensure_data_dir(&config)?;
            commands::review::review_pr(config, pr, repo, format).await
        }
    }
}

fn ensure_data_dir(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.storage.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.storage.data_dir.display()
        )
    })
}
