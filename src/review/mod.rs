//! Multi-pass pull request review
//!
//! - `context`: compact PR summary, findings by file, related-code distribution
//! - `grouping`: partitioning files into review units
//! - `batch`: bounded-concurrency dispatch with timeout and retry
//! - `parse`: lenient per-file response parsing
//! - `engine`: the `MultiPassReviewEngine` orchestrating all passes

mod batch;
mod context;
mod engine;
mod grouping;
mod keepalive;
mod parse;
pub mod prompt;
mod types;

pub use batch::{BatchOptions, BatchProcessor, TaskError, TaskOutcome};
pub use context::{distribute_chunks, group_findings_by_file, PrContext, PrStats};
pub use engine::{MultiPassReviewEngine, ProgressSink};
pub use grouping::{DefaultGroupingStrategy, FileGroupingStrategy, GroupingContext};
pub use keepalive::{KeepAlive, KeepAliveGuard, TracingKeepAlive};
pub use parse::{first_json_object, parse_per_file_response, strip_code_fence};
pub use types::*;
