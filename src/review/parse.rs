//! Lenient parsing of per-file LLM review responses

use super::types::{FileReview, FileVerdict, Finding, PerFileReview, ReviewUnit, RiskLevel, Severity};
use crate::util::truncate_str;
use serde_json::Value;
use tracing::debug;

const DERIVED_TITLE_CHARS: usize = 80;

/// Remove a surrounding Markdown code fence (with optional language tag)
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// First balanced `{...}` in `text`, ignoring braces inside JSON strings
pub fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_json(raw: &str) -> Result<Value, String> {
    let body = strip_code_fence(raw);
    match serde_json::from_str::<Value>(body) {
        Ok(value) => Ok(value),
        Err(direct) => {
            let candidate = first_json_object(body).ok_or_else(|| format!("no JSON object found ({})", direct))?;
            serde_json::from_str(candidate).map_err(|e| format!("embedded JSON invalid: {}", e))
        }
    }
}

fn field<'a>(value: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    value.get(camel).or_else(|| value.get(snake)).filter(|v| !v.is_null())
}

fn lenient<T: TryFrom<String>>(value: Option<&Value>) -> Option<T> {
    value
        .and_then(Value::as_str)
        .and_then(|s| T::try_from(s.to_string()).ok())
}

fn text(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a finding from whatever fields the model supplied.
///
/// Unknown or missing severity becomes `Medium`; a missing title is taken
/// from the description's first line, then the finding type.
fn lenient_finding(value: &Value) -> Option<Finding> {
    if let Some(title) = value.as_str().map(str::trim).filter(|s| !s.is_empty()) {
        return Some(Finding::new(Severity::default(), title));
    }
    if !value.is_object() {
        return None;
    }

    let description = text(value, "description");
    let finding_type = text(value, "type");
    let title = text(value, "title")
        .or_else(|| {
            description
                .as_deref()
                .and_then(|d| d.lines().next())
                .map(|first| truncate_str(first, DERIVED_TITLE_CHARS))
        })
        .or_else(|| finding_type.clone())
        .unwrap_or_else(|| "Untitled finding".to_string());

    let line = value
        .get("line")
        .and_then(|v| v.as_u64().or_else(|| v.as_str()?.trim().parse().ok()))
        .and_then(|l| u32::try_from(l).ok());

    Some(Finding {
        id: text(value, "id"),
        file: text(value, "file"),
        line,
        severity: lenient::<Severity>(value.get("severity")).unwrap_or_default(),
        finding_type,
        cwe: text(value, "cwe"),
        title,
        description,
        impact: text(value, "impact"),
        suggestion: text(value, "suggestion"),
        confidence: value.get("confidence").and_then(Value::as_f64).map(|c| c as f32),
    })
}

/// Turn a per-unit response into a `PerFileReview`. Never fails.
pub fn parse_per_file_response(raw: &str, unit: &ReviewUnit) -> PerFileReview {
    let fallback = |parse_error: String| PerFileReview::Fallback {
        file: unit.primary_file.clone(),
        raw_analysis: raw.to_string(),
        parse_error,
    };

    let value = match extract_json(raw) {
        Ok(value) => value,
        Err(e) => return fallback(e),
    };

    let Some(raw_findings) = value.get("findings").and_then(Value::as_array) else {
        return fallback("response has no findings array".to_string());
    };

    let findings: Vec<Finding> = raw_findings
        .iter()
        .filter_map(|f| {
            let finding = lenient_finding(f);
            if finding.is_none() {
                debug!("Skipping non-object finding for {}: {}", unit.primary_file, f);
            }
            finding
        })
        .map(|mut finding| {
            if finding.file.is_none() {
                finding.file = Some(unit.primary_file.clone());
            }
            finding.normalize()
        })
        .collect();

    let file = value
        .get("file")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| unit.primary_file.clone());
    let language = value
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| unit.primary().and_then(|f| f.language()));
    let positives = value
        .get("positives")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    PerFileReview::Parsed(FileReview {
        file,
        language,
        file_verdict: lenient::<FileVerdict>(field(&value, "fileVerdict", "file_verdict")).unwrap_or_default(),
        risk_level: lenient::<RiskLevel>(field(&value, "riskLevel", "risk_level")).unwrap_or_default(),
        findings,
        positives,
        test_coverage: field(&value, "testCoverage", "test_coverage").cloned(),
    })
}
