//! Default prompts for the per-unit and aggregation passes

use super::context::PrContext;
use super::types::{CommitSummary, ContextChunk, Finding, PerFileReview, ReviewUnit};
use crate::util::truncate_str;
use std::fmt::Write;

pub const PER_FILE_SYSTEM_PROMPT: &str = "You are a senior code reviewer. Review the changed files you are given \
and answer with a single JSON object: {\"file\": string, \"language\": string, \
\"fileVerdict\": \"APPROVE\"|\"NEEDS_CHANGES\"|\"DISCUSS\", \"riskLevel\": \"LOW\"|\"MEDIUM\"|\"HIGH\"|\"CRITICAL\", \
\"findings\": [{\"line\": number, \"severity\": \"critical\"|\"high\"|\"medium\"|\"low\", \"type\": string, \
\"cwe\": string, \"title\": string, \"description\": string, \"impact\": string, \"suggestion\": string, \
\"confidence\": number}], \"positives\": [string], \"testCoverage\": {\"hasTests\": boolean, \"missing\": [string]}}. \
Report only issues introduced or exposed by the diff.";

pub const AGGREGATION_SYSTEM_PROMPT: &str = "You are a senior code reviewer writing the final review of a pull request \
from per-file review results. Answer in Markdown with: an overall verdict (APPROVE, NEEDS_CHANGES or DISCUSS), \
an overall risk level, findings grouped by category and severity, cross-file issues, an assessment of test \
coverage, and a table of concrete test cases that should be added.";

/// Heading that introduces each file in a unit prompt
pub fn file_heading(filename: &str) -> String {
    format!("### File: {}", filename)
}

/// User message for one review unit
pub fn build_unit_prompt(
    context: &PrContext,
    unit: &ReviewUnit,
    findings: &[&Finding],
    chunks: &[&ContextChunk],
    max_patch_chars: usize,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Pull request\n{}", context.render());
    let _ = writeln!(out, "## Primary file: {}\n", unit.primary_file);

    for file in &unit.files {
        let _ = writeln!(out, "{}", file_heading(&file.filename));
        let _ = writeln!(
            out,
            "Status: {}, +{} -{}, language: {}",
            file.status,
            file.additions,
            file.deletions,
            file.language().as_deref().unwrap_or("unknown")
        );
        match file.patch {
            Some(ref patch) => {
                let _ = writeln!(out, "```diff\n{}\n```", truncate_str(patch, max_patch_chars));
            }
            None => {
                let _ = writeln!(out, "(no patch available)");
            }
        }
    }

    if !findings.is_empty() {
        let _ = writeln!(out, "\n## Static analysis findings");
        for finding in findings {
            let _ = writeln!(
                out,
                "- [{}] {}{}: {}",
                finding.severity,
                finding.file.as_deref().unwrap_or(&unit.primary_file),
                finding.line.map(|l| format!(":{}", l)).unwrap_or_default(),
                finding.title
            );
        }
    }

    if !chunks.is_empty() {
        let _ = writeln!(out, "\n## Related code");
        for chunk in chunks {
            let _ = writeln!(out, "From {}:\n```\n{}\n```", chunk.file_path, truncate_str(&chunk.content, 1500));
        }
    }

    out
}

/// User message for the aggregation pass
pub fn build_aggregation_prompt(
    context: &PrContext,
    results: &[PerFileReview],
    failed_files: &[String],
    commits: &[CommitSummary],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "## Pull request\n{}", context.render());

    if !commits.is_empty() {
        let _ = writeln!(out, "## Commits");
        for commit in commits {
            let first_line = commit.message.lines().next().unwrap_or("");
            let short_sha: String = commit.sha.chars().take(7).collect();
            let _ = writeln!(out, "- {} {}", short_sha, first_line);
        }
        out.push('\n');
    }

    let per_file = serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string());
    let _ = writeln!(out, "## Per-file review results\n```json\n{}\n```", per_file);

    if !failed_files.is_empty() {
        let _ = writeln!(out, "\n## Files that could not be reviewed\n{}", failed_files.join(", "));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewConfig;
    use crate::review::types::{PrData, PrFile, Severity};

    fn context() -> PrContext {
        let pr = PrData {
            title: "Fix login".to_string(),
            files: vec![PrFile::new("src/login.rs", 4, 1)],
            ..Default::default()
        };
        PrContext::summarize(&pr, &ReviewConfig::default())
    }

    #[test]
    fn test_unit_prompt_contents() {
        let unit = ReviewUnit::single(PrFile::new("src/login.rs", 4, 1).with_patch("+let x = 1;"));
        let finding = Finding::new(Severity::High, "Hardcoded secret").in_file("src/login.rs");
        let prompt = build_unit_prompt(&context(), &unit, &[&finding], &[], 12_000);

        assert!(prompt.contains("### File: src/login.rs"));
        assert!(prompt.contains("+let x = 1;"));
        assert!(prompt.contains("[high] src/login.rs: Hardcoded secret"));
        assert!(!prompt.contains("## Related code"));
    }

    #[test]
    fn test_patch_truncated() {
        let unit = ReviewUnit::single(PrFile::new("src/big.rs", 1, 0).with_patch("x".repeat(500)));
        let prompt = build_unit_prompt(&context(), &unit, &[], &[], 100);
        assert!(!prompt.contains(&"x".repeat(101)));
    }

    #[test]
    fn test_aggregation_prompt_lists_failures() {
        let commits = vec![CommitSummary {
            sha: "0123456789".to_string(),
            message: "fix login\n\nlong body".to_string(),
        }];
        let prompt = build_aggregation_prompt(&context(), &[], &["src/c.rs".to_string()], &commits);
        assert!(prompt.contains("- 0123456 fix login"));
        assert!(prompt.contains("src/c.rs"));
        assert!(!prompt.contains("long body"));
    }
}
