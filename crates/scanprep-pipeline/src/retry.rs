// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry policy with exponential backoff for per-page transforms and blob
// store uploads.
//
// Errors are classified as Transient (retry until the attempt budget runs
// out) or Permanent (give up at once).

use std::time::Duration;

use scanprep_core::config::RetrySettings;
use scanprep_core::error::ScanprepError;
use scanprep_core::types::ErrorClass;
use tracing::{debug, info, warn};

/// Attempt budget and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy with no waiting between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed
    /// with `err`.
    pub fn decide(&self, err: &ScanprepError, attempt: u32) -> RetryDecision {
        match classify_error(err) {
            ErrorClass::Permanent => {
                info!(error = %err, "permanent error, not retrying");
                RetryDecision::GiveUp(ErrorClass::Permanent)
            }
            ErrorClass::Transient => {
                if attempt >= self.max_attempts {
                    warn!(attempt, max = self.max_attempts, "retry limit exhausted");
                    RetryDecision::Exhausted
                } else {
                    let delay = self.delay_after(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling retry");
                    RetryDecision::RetryAfter(delay)
                }
            }
        }
    }

    /// Backoff after failed attempt `attempt` (1-based).
    ///
    /// delay = min(base * 2^(attempt-1) + jitter, max_delay), with jitter in
    /// `[0, base/4)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let exponent = attempt.saturating_sub(1).min(16);
        let exp_ms = base_ms.saturating_mul(1u64 << exponent);
        let total_ms = exp_ms.saturating_add(jitter(base_ms / 4, attempt));
        Duration::from_millis(total_ms.min(self.max_delay.as_millis() as u64))
    }
}

/// Outcome of evaluating a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// Do not retry; the error cannot resolve itself.
    GiveUp(ErrorClass),
    /// Attempt budget used up.
    Exhausted,
}

/// Classify a `ScanprepError` for retry decisions.
pub fn classify_error(err: &ScanprepError) -> ErrorClass {
    match err {
        // Transient: decode hiccups, stage failures, flaky collaborators
        ScanprepError::ImageError(_) => ErrorClass::Transient,
        ScanprepError::Stage { .. } => ErrorClass::Transient,
        ScanprepError::Rasterize(_) => ErrorClass::Transient,
        ScanprepError::Store(_) => ErrorClass::Transient,
        ScanprepError::TaskPanicked(_) => ErrorClass::Transient,

        // Permanent: missing input, structure, configuration
        ScanprepError::EmptyInput => ErrorClass::Permanent,
        ScanprepError::InputNotFound(_) => ErrorClass::Permanent,
        ScanprepError::UnsupportedRaster(_) => ErrorClass::Permanent,
        ScanprepError::PdfError(_) => ErrorClass::Permanent,
        ScanprepError::Config(_) => ErrorClass::Permanent,
        ScanprepError::Serialization(_) => ErrorClass::Permanent,
        ScanprepError::PoolClosed(_) => ErrorClass::Permanent,

        // IO errors depend on the kind
        ScanprepError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                ErrorClass::Permanent
            }
            _ => ErrorClass::Transient,
        },
    }
}

/// Spread retries of different attempts apart without a random source.
fn jitter(range_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % range_ms.max(1)
}
