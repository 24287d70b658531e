//! Preparing stage: compact PR summary, findings by file, context distribution

use super::types::{ContextChunk, Finding, PrData, PrFile};
use crate::config::ReviewConfig;
use crate::util::truncate_str;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrStats {
    pub files_changed: usize,
    pub additions: u64,
    pub deletions: u64,
    pub commits: usize,
}

/// Small PR summary shared by every prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrContext {
    pub title: String,
    pub description: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    /// At most `context_max_files` entries
    pub files: Vec<String>,
    pub omitted_files: usize,
    pub stats: PrStats,
}

impl PrContext {
    pub fn summarize(pr: &PrData, config: &ReviewConfig) -> Self {
        let description = pr
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(|d| truncate_str(d, config.description_max_chars));

        let files: Vec<String> = pr
            .files
            .iter()
            .take(config.context_max_files)
            .map(|f| format!("{} (+{} -{})", f.filename, f.additions, f.deletions))
            .collect();

        let stats = PrStats {
            files_changed: pr.files.len(),
            additions: pr.files.iter().map(|f| f.additions as u64).sum(),
            deletions: pr.files.iter().map(|f| f.deletions as u64).sum(),
            commits: pr.commits.len(),
        };

        Self {
            title: pr.title.clone(),
            description,
            base_branch: pr.base_branch.clone(),
            head_branch: pr.head_branch.clone(),
            omitted_files: pr.files.len().saturating_sub(files.len()),
            files,
            stats,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Title: {}", self.title);
        if let Some(ref description) = self.description {
            let _ = writeln!(out, "Description: {}", description);
        }
        if let (Some(base), Some(head)) = (&self.base_branch, &self.head_branch) {
            let _ = writeln!(out, "Branches: {} <- {}", base, head);
        }
        let _ = writeln!(
            out,
            "Stats: {} files, +{} -{}, {} commits",
            self.stats.files_changed, self.stats.additions, self.stats.deletions, self.stats.commits
        );
        let _ = writeln!(out, "Changed files:");
        for file in &self.files {
            let _ = writeln!(out, "- {}", file);
        }
        if self.omitted_files > 0 {
            let _ = writeln!(out, "- ... and {} more", self.omitted_files);
        }
        out
    }
}

/// Group findings by file path; findings without a file are dropped
pub fn group_findings_by_file(findings: &[Finding]) -> BTreeMap<String, Vec<Finding>> {
    let mut grouped: BTreeMap<String, Vec<Finding>> = BTreeMap::new();
    for finding in findings {
        if let Some(ref file) = finding.file {
            grouped
                .entry(file.clone())
                .or_default()
                .push(finding.clone().normalize());
        }
    }
    grouped
}

/// Whether one path is the other or a suffix of it at a segment boundary
fn paths_overlap(a: &str, b: &str) -> bool {
    let a = a.trim_start_matches("./");
    let b = b.trim_start_matches("./");
    if a == b {
        return true;
    }
    let (long, short) = if a.len() > b.len() { (a, b) } else { (b, a) };
    long.ends_with(short) && long[..long.len() - short.len()].ends_with('/')
}

fn same_directory(a: &str, b: &str) -> bool {
    match (Path::new(a).parent(), Path::new(b).parent()) {
        (Some(pa), Some(pb)) => !pa.as_os_str().is_empty() && pa == pb,
        _ => false,
    }
}

/// Attach retrieved chunks to changed files.
///
/// Chunks whose path overlaps the file come first, then chunks from the same
/// directory, each in the order given, up to `max_per_file`.
pub fn distribute_chunks(
    files: &[PrFile],
    chunks: &[ContextChunk],
    max_per_file: usize,
) -> HashMap<String, Vec<ContextChunk>> {
    let mut distributed = HashMap::new();
    if max_per_file == 0 || chunks.is_empty() {
        return distributed;
    }

    for file in files {
        let overlapping = chunks
            .iter()
            .filter(|c| paths_overlap(&c.file_path, &file.filename));
        let nearby = chunks.iter().filter(|c| {
            !paths_overlap(&c.file_path, &file.filename) && same_directory(&c.file_path, &file.filename)
        });

        let selected: Vec<ContextChunk> = overlapping.chain(nearby).take(max_per_file).cloned().collect();
        if !selected.is_empty() {
            distributed.insert(file.filename.clone(), selected);
        }
    }
    distributed
}
