//! Multi-pass pull request review orchestration
//!
//! One `execute` call walks through preparing, grouping, reviewing and
//! aggregating. Per-unit calls run through the `BatchProcessor`, so a unit
//! that times out or errors is recorded in `failed_files` instead of
//! aborting the review. Only the final aggregation call can fail the whole
//! run.

use super::batch::{BatchOptions, BatchProcessor};
use super::context::{distribute_chunks, group_findings_by_file, PrContext};
use super::grouping::{DefaultGroupingStrategy, FileGroupingStrategy, GroupingContext};
use super::keepalive::{KeepAlive, KeepAliveGuard, TracingKeepAlive};
use super::parse::parse_per_file_response;
use super::prompt::{build_aggregation_prompt, build_unit_prompt, AGGREGATION_SYSTEM_PROMPT, PER_FILE_SYSTEM_PROMPT};
use super::types::{MultiPassResult, PerFileReview, Phase, ProgressEvent, ReviewError, ReviewRequest};
use crate::config::ReviewConfig;
use crate::llm::{ChatMessage, LlmClient, LlmError, LlmOptions};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Receives progress events synchronously
pub type ProgressSink = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

pub struct MultiPassReviewEngine {
    llm: Arc<dyn LlmClient>,
    grouping: Arc<dyn FileGroupingStrategy>,
    keepalive: Arc<dyn KeepAlive>,
    progress: Option<ProgressSink>,
    config: ReviewConfig,
}

impl MultiPassReviewEngine {
    pub fn new(llm: Arc<dyn LlmClient>, config: ReviewConfig) -> Self {
        Self {
            llm,
            grouping: Arc::new(DefaultGroupingStrategy),
            keepalive: Arc::new(TracingKeepAlive),
            progress: None,
            config,
        }
    }

    pub fn with_grouping(mut self, grouping: Arc<dyn FileGroupingStrategy>) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Arc<dyn KeepAlive>) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    fn report(&self, event: ProgressEvent) {
        if let Some(ref sink) = self.progress {
            sink(&event);
        }
    }

    /// Run a full multi-pass review
    pub async fn execute(&self, request: &ReviewRequest, options: &LlmOptions) -> Result<MultiPassResult, ReviewError> {
        let started = Instant::now();
        let pr = &request.pr;

        // Aborted on every return path, including errors
        let _keepalive = KeepAliveGuard::start(self.keepalive.clone(), self.config.keepalive_interval());

        self.report(ProgressEvent::phase(
            Phase::Preparing,
            format!("Preparing context for {} files", pr.files.len()),
        ));
        let context = PrContext::summarize(pr, &self.config);
        let findings_by_file = group_findings_by_file(&request.static_findings);
        let chunks_by_file = distribute_chunks(
            &pr.files,
            &request.context_chunks,
            self.config.max_rag_chunks_per_file,
        );
        debug!(
            "Prepared review context: {} files with findings, {} files with related code",
            findings_by_file.len(),
            chunks_by_file.len()
        );

        self.report(ProgressEvent::phase(Phase::Grouping, "Grouping files into review units"));
        let grouping_ctx = GroupingContext {
            findings_by_file: &findings_by_file,
            max_files: self.config.max_files_to_review,
        };
        let units = self.grouping.group(&pr.files, &grouping_ctx);
        let total_units = units.len();
        info!(
            "Reviewing {} of {} files in {} units",
            units.iter().map(|u| u.files.len()).sum::<usize>(),
            pr.files.len(),
            total_units
        );

        self.report(ProgressEvent::units(
            0,
            total_units,
            format!("Reviewing {} units", total_units),
        ));

        let processor = BatchProcessor::new(BatchOptions::from(&self.config));
        let outcomes = processor
            .run(
                &units,
                |_, unit| {
                    let unit_findings: Vec<_> = unit
                        .filenames()
                        .filter_map(|name| findings_by_file.get(name))
                        .flatten()
                        .collect();
                    let unit_chunks: Vec<_> = unit
                        .filenames()
                        .filter_map(|name| chunks_by_file.get(name))
                        .flatten()
                        .collect();
                    let prompt = build_unit_prompt(
                        &context,
                        unit,
                        &unit_findings,
                        &unit_chunks,
                        self.config.max_patch_chars,
                    );
                    let messages = vec![ChatMessage::system(PER_FILE_SYSTEM_PROMPT), ChatMessage::user(prompt)];
                    async move {
                        let response = self.llm.stream_chat(&messages, options).await?;
                        Ok::<_, LlmError>(response.content)
                    }
                },
                |outcome, completed, total| {
                    let unit = &units[outcome.index];
                    let message = match outcome.result {
                        Ok(_) => format!("Reviewed {}", unit.primary_file),
                        Err(ref e) => format!("Failed to review {}: {}", unit.primary_file, e),
                    };
                    self.report(ProgressEvent::units(completed, total, message));
                },
            )
            .await;

        let mut per_file_findings: Vec<PerFileReview> = Vec::with_capacity(outcomes.len());
        let mut failed_files = Vec::new();
        for outcome in outcomes {
            let unit = &units[outcome.index];
            match outcome.result {
                Ok(content) => {
                    let review = parse_per_file_response(&content, unit);
                    if review.is_fallback() {
                        debug!("Unit {} returned unstructured text", unit.primary_file);
                    }
                    per_file_findings.push(review);
                }
                Err(e) => {
                    warn!(
                        "Review of {} failed after {} attempts: {}",
                        unit.primary_file, outcome.attempts, e
                    );
                    failed_files.push(unit.primary_file.clone());
                }
            }
        }

        self.report(ProgressEvent::phase(
            Phase::Aggregating,
            format!("Aggregating {} file reviews", per_file_findings.len()),
        ));
        let prompt = build_aggregation_prompt(&context, &per_file_findings, &failed_files, &pr.commits);
        let messages = vec![ChatMessage::system(AGGREGATION_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let analysis = self
            .llm
            .stream_chat(&messages, options)
            .await
            .map_err(|e| {
                warn!("Aggregation call failed: {}", e);
                ReviewError::Aggregation(e)
            })?
            .content;

        let result = MultiPassResult {
            analysis,
            per_file_findings,
            failed_files,
            review_units: total_units,
            processing_time_ms: started.elapsed().as_millis() as u64,
            is_multi_pass: true,
        };

        info!(
            "Review complete: {} units, {} findings, {} failed in {}ms",
            result.review_units,
            result.total_findings(),
            result.failed_files.len(),
            result.processing_time_ms
        );
        self.report(ProgressEvent::phase(Phase::Complete, "Review complete"));

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::keepalive::tests::CountingKeepAlive;
    use crate::review::prompt::file_heading;
    use crate::review::types::{PrData, PrFile, ReviewUnit};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Answers per-unit prompts with a JSON review, hangs for `hang_on`
    struct ScriptedLlm {
        hang_on: Option<String>,
        prose: bool,
        fail_aggregation: bool,
    }

    impl ScriptedLlm {
        fn ok() -> Self {
            Self {
                hang_on: None,
                prose: false,
                fail_aggregation: false,
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn stream_chat(&self, messages: &[ChatMessage], _options: &LlmOptions) -> Result<crate::llm::ChatResponse, LlmError> {
            if messages[0].content == AGGREGATION_SYSTEM_PROMPT {
                if self.fail_aggregation {
                    return Err(LlmError::Api {
                        status: 500,
                        message: "boom".to_string(),
                    });
                }
                return Ok(crate::llm::ChatResponse {
                    content: "## Verdict: APPROVE".to_string(),
                });
            }

            let prompt = &messages[1].content;
            if let Some(ref name) = self.hang_on {
                if prompt.contains(&file_heading(name)) {
                    std::future::pending::<()>().await;
                }
            }
            let content = if self.prose {
                "Looks good to me.".to_string()
            } else {
                r#"{"fileVerdict":"APPROVE","riskLevel":"LOW","findings":[{"severity":"low","title":"nit"}]}"#.to_string()
            };
            Ok(crate::llm::ChatResponse { content })
        }
    }

    fn five_file_request() -> ReviewRequest {
        ReviewRequest {
            pr: PrData {
                title: "Refactor".to_string(),
                files: ["a.rs", "b.rs", "c.rs", "d.rs", "e.rs"]
                    .iter()
                    .map(|name| PrFile::new(*name, 5, 1))
                    .collect(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn engine(llm: ScriptedLlm) -> MultiPassReviewEngine {
        MultiPassReviewEngine::new(Arc::new(llm), ReviewConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_unit_is_recorded_not_fatal() {
        let llm = ScriptedLlm {
            hang_on: Some("c.rs".to_string()),
            ..ScriptedLlm::ok()
        };
        let result = engine(llm)
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap();

        assert_eq!(result.review_units, 5);
        assert_eq!(result.per_file_findings.len(), 4);
        assert_eq!(result.failed_files, vec!["c.rs".to_string()]);
        assert!(result.per_file_findings.iter().all(|r| r.file() != "c.rs"));
        assert_eq!(result.analysis, "## Verdict: APPROVE");
        assert!(result.is_multi_pass);
        assert_eq!(result.total_findings(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prose_units_become_fallbacks() {
        let llm = ScriptedLlm {
            prose: true,
            ..ScriptedLlm::ok()
        };
        let result = engine(llm)
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap();

        assert_eq!(result.per_file_findings.len(), 5);
        assert!(result.per_file_findings.iter().all(PerFileReview::is_fallback));
        assert_eq!(result.total_findings(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_is_monotonic() {
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: ProgressSink = Arc::new(move |event: &ProgressEvent| sink_events.lock().push(event.clone()));

        engine(ScriptedLlm::ok())
            .with_progress(sink)
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap();

        let events = events.lock();
        let phases: Vec<Phase> = events.iter().map(|e| e.phase).collect();
        assert!(phases.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(phases.first(), Some(&Phase::Preparing));
        assert_eq!(phases.last(), Some(&Phase::Complete));

        let completed: Vec<usize> = events.iter().filter_map(|e| e.completed_units).collect();
        assert_eq!(completed, vec![0, 1, 2, 3, 4, 5]);
        assert!(completed.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aggregation_failure_rejects_and_releases_keepalive() {
        let keepalive = Arc::new(CountingKeepAlive::default());
        let llm = ScriptedLlm {
            fail_aggregation: true,
            ..ScriptedLlm::ok()
        };
        let err = engine(llm)
            .with_keepalive(keepalive.clone())
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Aggregation(LlmError::Api { status: 500, .. })));

        let pings = keepalive.count();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(keepalive.count(), pings);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings_during_slow_review() {
        let keepalive = Arc::new(CountingKeepAlive::default());
        let llm = ScriptedLlm {
            hang_on: Some("a.rs".to_string()),
            ..ScriptedLlm::ok()
        };
        engine(llm)
            .with_keepalive(keepalive.clone())
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap();
        // Two 120s timeouts plus the retry delay
        assert!(keepalive.count() >= 8);
    }

    #[tokio::test]
    async fn test_empty_pr_still_aggregates() {
        let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let sink: ProgressSink = Arc::new(move |event: &ProgressEvent| sink_events.lock().push(event.clone()));

        let result = engine(ScriptedLlm::ok())
            .with_progress(sink)
            .execute(&ReviewRequest::default(), &LlmOptions::default())
            .await
            .unwrap();

        assert_eq!(result.review_units, 0);
        assert!(result.per_file_findings.is_empty());
        assert!(result.failed_files.is_empty());
        assert_eq!(result.analysis, "## Verdict: APPROVE");
        assert_eq!(events.lock().last().map(|e| e.phase), Some(Phase::Complete));
    }

    struct OneUnit;

    impl FileGroupingStrategy for OneUnit {
        fn group(&self, files: &[PrFile], _ctx: &GroupingContext<'_>) -> Vec<ReviewUnit> {
            vec![ReviewUnit {
                primary_file: files[0].filename.clone(),
                files: files.to_vec(),
            }]
        }
    }

    #[tokio::test]
    async fn test_custom_grouping_strategy() {
        let result = engine(ScriptedLlm::ok())
            .with_grouping(Arc::new(OneUnit))
            .execute(&five_file_request(), &LlmOptions::default())
            .await
            .unwrap();
        assert_eq!(result.review_units, 1);
        assert_eq!(result.per_file_findings.len(), 1);
        assert_eq!(result.per_file_findings[0].file(), "a.rs");
    }
}
