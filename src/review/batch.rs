//! Bounded-concurrency task runner with per-attempt timeout and retry

use crate::config::ReviewConfig;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    pub timeout: Duration,
    pub max_retries: usize,
    pub retry_delay: Duration,
}

impl From<&ReviewConfig> for BatchOptions {
    fn from(config: &ReviewConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            timeout: config.task_timeout(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&ReviewConfig::default())
    }
}

/// Why a task gave up after all attempts
#[derive(Debug)]
pub enum TaskError<E> {
    Timeout(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for TaskError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout(after) => write!(f, "timed out after {:?}", after),
            Self::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Result of one task, tagged with its submission index
#[derive(Debug)]
pub struct TaskOutcome<T, E> {
    pub index: usize,
    pub attempts: usize,
    pub result: Result<T, TaskError<E>>,
}

/// Runs one async task per item, at most `max_concurrent` at a time.
///
/// A failing item never aborts the batch; outcomes are returned in
/// completion order and `on_complete` is called as each one lands.
#[derive(Debug, Clone, Default)]
pub struct BatchProcessor {
    options: BatchOptions,
}

impl BatchProcessor {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    pub async fn run<I, T, E, F, Fut, C>(&self, items: &[I], task: F, mut on_complete: C) -> Vec<TaskOutcome<T, E>>
    where
        F: Fn(usize, &I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        C: FnMut(&TaskOutcome<T, E>, usize, usize),
    {
        let total = items.len();
        let semaphore = Semaphore::new(self.options.max_concurrent.max(1));
        let options = self.options;

        let mut pending: FuturesUnordered<_> = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let semaphore = &semaphore;
                let task = &task;
                async move {
                    let _permit = semaphore.acquire().await.ok();
                    let mut attempts = 0;
                    let mut last_error = None;

                    while attempts <= options.max_retries {
                        if attempts > 0 {
                            tokio::time::sleep(options.retry_delay).await;
                        }
                        attempts += 1;

                        match tokio::time::timeout(options.timeout, task(index, item)).await {
                            Ok(Ok(value)) => {
                                return TaskOutcome {
                                    index,
                                    attempts,
                                    result: Ok(value),
                                };
                            }
                            Ok(Err(e)) => {
                                debug!("Task {} attempt {} failed: {}", index, attempts, e);
                                last_error = Some(TaskError::Failed(e));
                            }
                            Err(_) => {
                                debug!("Task {} attempt {} timed out", index, attempts);
                                last_error = Some(TaskError::Timeout(options.timeout));
                            }
                        }
                    }

                    TaskOutcome {
                        index,
                        attempts,
                        result: Err(last_error.unwrap_or(TaskError::Timeout(options.timeout))),
                    }
                }
            })
            .collect();

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = pending.next().await {
            on_complete(&outcome, outcomes.len() + 1, total);
            outcomes.push(outcome);
        }
        outcomes
    }
}
