//! Pull request and review result data model

use crate::llm::LlmError;
use crate::retrieval::HybridResult;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;

/// A changed file in a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrFile {
    pub filename: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub additions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

fn default_status() -> String {
    "modified".to_string()
}

impl PrFile {
    pub fn new(filename: impl Into<String>, additions: u32, deletions: u32) -> Self {
        Self {
            filename: filename.into(),
            status: default_status(),
            additions,
            deletions,
            patch: None,
            language: None,
        }
    }

    pub fn with_patch(mut self, patch: impl Into<String>) -> Self {
        self.patch = Some(patch.into());
        self
    }

    pub fn changes(&self) -> u32 {
        self.additions.saturating_add(self.deletions)
    }

    /// Declared language, or one guessed from the file extension
    pub fn language(&self) -> Option<String> {
        self.language
            .clone()
            .or_else(|| detect_language(&self.filename).map(str::to_string))
    }
}

/// Guess a language name from a file extension
pub fn detect_language(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_lowercase();
    let lang = match ext.as_str() {
        "rs" => "rust",
        "py" => "python",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" | "cxx" => "cpp",
        "swift" => "swift",
        "scala" => "scala",
        "sh" | "bash" => "shell",
        "sql" => "sql",
        _ => return None,
    };
    Some(lang)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    #[serde(default)]
    pub sha: String,
    pub message: String,
}

/// Normalized pull request data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PrData {
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub base_branch: Option<String>,
    pub head_branch: Option<String>,
    pub files: Vec<PrFile>,
    pub commits: Vec<CommitSummary>,
}

/// A retrieved code chunk offered to the reviewer as extra context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextChunk {
    pub file_path: String,
    pub content: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub score: Option<f32>,
}

impl ContextChunk {
    /// Convert a hybrid search hit; hits without a file path are skipped
    pub fn from_result(result: &HybridResult) -> Option<Self> {
        let file_path = result.metadata.file_path.clone()?;
        Some(Self {
            file_path,
            content: result.content.clone(),
            symbol: result.metadata.symbol_name.clone(),
            score: Some(result.score),
        })
    }
}

/// Everything `MultiPassReviewEngine::execute` needs for one review
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReviewRequest {
    pub pr: PrData,
    /// Static-analysis findings produced before the LLM passes
    pub static_findings: Vec<Finding>,
    /// Retrieved context, usually the top hybrid search hits
    pub context_chunks: Vec<ContextChunk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "low" | "info" | "minor" => Ok(Self::Low),
            "medium" | "moderate" | "warning" => Ok(Self::Medium),
            "high" | "major" | "error" => Ok(Self::High),
            "critical" | "blocker" => Ok(Self::Critical),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// One review finding, either from static analysis or from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub severity: Severity,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub finding_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl Finding {
    pub fn new(severity: Severity, title: impl Into<String>) -> Self {
        Self {
            id: None,
            file: None,
            line: None,
            severity,
            finding_type: None,
            cwe: None,
            title: title.into(),
            description: None,
            impact: None,
            suggestion: None,
            confidence: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Clamp confidence into [0, 1]; NaN is dropped
    pub fn normalize(mut self) -> Self {
        self.confidence = self
            .confidence
            .filter(|c| !c.is_nan())
            .map(|c| c.clamp(0.0, 1.0));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum FileVerdict {
    Approve,
    NeedsChanges,
    #[default]
    Discuss,
}

impl TryFrom<String> for FileVerdict {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().replace([' ', '-'], "_").as_str() {
            "APPROVE" | "APPROVED" => Ok(Self::Approve),
            "NEEDS_CHANGES" | "REQUEST_CHANGES" | "CHANGES_REQUESTED" => Ok(Self::NeedsChanges),
            "DISCUSS" | "COMMENT" => Ok(Self::Discuss),
            other => Err(format!("unknown verdict: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl TryFrom<String> for RiskLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}

/// Structured review of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReview {
    pub file: String,
    pub language: Option<String>,
    pub file_verdict: FileVerdict,
    pub risk_level: RiskLevel,
    pub findings: Vec<Finding>,
    pub positives: Vec<String>,
    pub test_coverage: Option<serde_json::Value>,
}

/// Result of one per-unit review call
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PerFileReview {
    Parsed(FileReview),
    /// The model answered with something that was not a usable JSON review
    Fallback {
        file: String,
        #[serde(rename = "rawAnalysis")]
        raw_analysis: String,
        #[serde(rename = "parseError")]
        parse_error: String,
    },
}

// Fallbacks carry an explicit empty `findings` array on the wire
impl Serialize for PerFileReview {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Parsed(review) => review.serialize(serializer),
            Self::Fallback {
                file,
                raw_analysis,
                parse_error,
            } => {
                let mut state = serializer.serialize_struct("PerFileReview", 4)?;
                state.serialize_field("file", file)?;
                state.serialize_field("rawAnalysis", raw_analysis)?;
                state.serialize_field("parseError", parse_error)?;
                state.serialize_field("findings", &[] as &[Finding])?;
                state.end()
            }
        }
    }
}

impl PerFileReview {
    pub fn file(&self) -> &str {
        match self {
            Self::Parsed(review) => &review.file,
            Self::Fallback { file, .. } => file,
        }
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Parsed(review) => &review.findings,
            Self::Fallback { .. } => &[],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Files reviewed together in a single LLM call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewUnit {
    pub files: Vec<PrFile>,
    pub primary_file: String,
}

impl ReviewUnit {
    pub fn single(file: PrFile) -> Self {
        Self {
            primary_file: file.filename.clone(),
            files: vec![file],
        }
    }

    pub fn primary(&self) -> Option<&PrFile> {
        self.files.iter().find(|f| f.filename == self.primary_file)
    }

    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.filename.as_str())
    }
}

/// Final output of a multi-pass review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiPassResult {
    /// Raw aggregation text, rendered by the caller
    pub analysis: String,
    pub per_file_findings: Vec<PerFileReview>,
    pub failed_files: Vec<String>,
    pub review_units: usize,
    #[serde(rename = "processingTime")]
    pub processing_time_ms: u64,
    pub is_multi_pass: bool,
}

impl MultiPassResult {
    pub fn total_findings(&self) -> usize {
        self.per_file_findings.iter().map(|r| r.findings().len()).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preparing,
    Grouping,
    Reviewing,
    Aggregating,
    Complete,
}

/// Progress notification emitted during `execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_units: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_units: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<u8>,
}

impl ProgressEvent {
    pub fn phase(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
            completed_units: None,
            total_units: None,
            percentage: None,
        }
    }

    pub fn units(completed: usize, total: usize, message: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            100
        } else {
            ((completed * 100) / total).min(100) as u8
        };
        Self {
            phase: Phase::Reviewing,
            message: message.into(),
            completed_units: Some(completed),
            total_units: Some(total),
            percentage: Some(percentage),
        }
    }
}

/// Errors that abort a review
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Aggregation call failed: {0}")]
    Aggregation(#[source] LlmError),
}
