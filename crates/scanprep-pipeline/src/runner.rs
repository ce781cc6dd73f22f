// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch runner — applies one fallible per-page transform to every item of a
// batch, with per-page retry, and reports an outcome for each page.
//
// A page that exhausts its retries is marked failed and the batch moves on.
// Parallel dispatch fans pages out over a `WorkerPool`; each page is an
// independent task and the transform is only ever borrowed immutably.

use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use scanprep_core::config::PipelineConfig;
use scanprep_core::error::{Result, ScanprepError};
use scanprep_core::types::{DispatchMode, ErrorClass};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::pool::WorkerPool;
use crate::retry::{RetryDecision, RetryPolicy, classify_error};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Shared flag that stops a batch from starting further pages. Pages already
/// running finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What happened to one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome<O> {
    Completed { output: O, attempts: u32 },
    Failed {
        attempts: u32,
        error: String,
        class: ErrorClass,
    },
    /// The batch was cancelled before this page started.
    Cancelled,
}

impl<O> ProcessingOutcome<O> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn output(&self) -> Option<&O> {
        match self {
            Self::Completed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Attempts spent on the page; zero when it never started.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}

/// One page and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEntry<T, O> {
    pub item: T,
    pub outcome: ProcessingOutcome<O>,
}

/// Counts over a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Outcomes of a batch, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport<T, O> {
    entries: Vec<BatchEntry<T, O>>,
}

impl<T, O> BatchReport<T, O> {
    pub fn entries(&self) -> &[BatchEntry<T, O>] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<BatchEntry<T, O>> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outputs of the pages that completed, in input order.
    pub fn outputs(&self) -> impl Iterator<Item = &O> {
        self.entries.iter().filter_map(|e| e.outcome.output())
    }

    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.entries.len(),
            ..BatchSummary::default()
        };
        for entry in &self.entries {
            match entry.outcome {
                ProcessingOutcome::Completed { .. } => summary.succeeded += 1,
                ProcessingOutcome::Failed { .. } => summary.failed += 1,
                ProcessingOutcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Applies a transform to every page of a batch.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    policy: RetryPolicy,
    mode: DispatchMode,
    workers: usize,
    cancel: CancelToken,
}

impl Default for BatchRunner {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), DispatchMode::default())
    }
}

impl BatchRunner {
    pub fn new(policy: RetryPolicy, mode: DispatchMode) -> Self {
        Self {
            policy,
            mode,
            workers: WorkerPool::default_size(),
            cancel: CancelToken::new(),
        }
    }

    /// Runner configured from the retry and batch sections of `config`.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let runner = Self::new(config.retry.into(), config.batch.mode);
        match config.batch.workers {
            Some(workers) => runner.with_workers(workers),
            None => runner,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Run `transform` over `items`. Never fails as a whole: every item gets
    /// an outcome, in the order given.
    #[instrument(skip_all, fields(items = items.len(), mode = ?self.mode))]
    pub fn run<T, O, F>(&self, items: &[T], transform: F) -> BatchReport<T, O>
    where
        T: Clone + Debug + Send + Sync + 'static,
        O: Send + 'static,
        F: Fn(&T) -> Result<O> + Send + Sync + 'static,
    {
        let entries = match self.mode {
            DispatchMode::Sequential => self.run_sequential(items, &transform),
            DispatchMode::Parallel => self.run_parallel(items, transform),
        };
        let report = BatchReport { entries };
        let summary = report.summary();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Batch finished"
        );
        report
    }

    fn run_sequential<T, O, F>(&self, items: &[T], transform: &F) -> Vec<BatchEntry<T, O>>
    where
        T: Clone + Debug,
        F: Fn(&T) -> Result<O>,
    {
        items
            .iter()
            .map(|item| {
                let outcome = if self.cancel.is_cancelled() {
                    ProcessingOutcome::Cancelled
                } else {
                    process_with_retry(item, transform, &self.policy)
                };
                BatchEntry {
                    item: item.clone(),
                    outcome,
                }
            })
            .collect()
    }

    fn run_parallel<T, O, F>(&self, items: &[T], transform: F) -> Vec<BatchEntry<T, O>>
    where
        T: Clone + Debug + Send + Sync + 'static,
        O: Send + 'static,
        F: Fn(&T) -> Result<O> + Send + Sync + 'static,
    {
        let pool = match WorkerPool::new(self.workers.min(items.len()).max(1)) {
            Ok(pool) => pool,
            Err(err) => {
                warn!(error = %err, "Worker pool unavailable, running sequentially");
                return self.run_sequential(items, &transform);
            }
        };
        let transform = Arc::new(transform);

        let handles: Vec<_> = items
            .iter()
            .map(|item| {
                let item = item.clone();
                let transform = Arc::clone(&transform);
                let cancel = self.cancel.clone();
                let policy = self.policy;
                pool.submit(move || {
                    if cancel.is_cancelled() {
                        ProcessingOutcome::Cancelled
                    } else {
                        process_with_retry(&item, transform.as_ref(), &policy)
                    }
                })
            })
            .collect();

        items
            .iter()
            .zip(handles)
            .map(|(item, handle)| {
                let outcome = handle
                    .and_then(|h| h.wait())
                    .unwrap_or_else(|err| failed_outcome(item, 0, &err));
                BatchEntry {
                    item: item.clone(),
                    outcome,
                }
            })
            .collect()
    }
}

/// Attempt one page until it succeeds, fails permanently, or runs out of
/// attempts. Panics inside the transform count as failed attempts.
fn process_with_retry<T, O, F>(item: &T, transform: &F, policy: &RetryPolicy) -> ProcessingOutcome<O>
where
    T: Debug,
    F: Fn(&T) -> Result<O>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = panic::catch_unwind(AssertUnwindSafe(|| transform(item)))
            .unwrap_or_else(|payload| {
                Err(ScanprepError::TaskPanicked(panic_message(payload.as_ref())))
            });

        let err = match result {
            Ok(output) => {
                return ProcessingOutcome::Completed {
                    output,
                    attempts: attempt,
                };
            }
            Err(err) => err,
        };
        warn!(item = ?item, attempt, error = %err, "Page attempt failed");

        match policy.decide(&err, attempt) {
            RetryDecision::RetryAfter(delay) => {
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            RetryDecision::GiveUp(_) | RetryDecision::Exhausted => {
                return failed_outcome(item, attempt, &err);
            }
        }
    }
}

fn failed_outcome<T: Debug, O>(item: &T, attempts: u32, err: &ScanprepError) -> ProcessingOutcome<O> {
    error!(item = ?item, attempts, error = %err, "Page failed");
    ProcessingOutcome::Failed {
        attempts,
        error: err.to_string(),
        class: classify_error(err),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
