//! Poll failure classification and per-class retry budgets.
//!
//! Each poll result is turned into a [`PollVerdict`]. Transient failures
//! are charged to their own counter in [`PollMeta`] and only become fatal
//! once that counter passes its budget in [`RetryBudgets`].

use std::time::Duration;

use arcana_core::generation::{
    GENERIC_FAILURE_MESSAGE, HTTP_RETRY_LIMIT, NETWORK_RETRY_LIMIT, NOT_FOUND_RETRY_LIMIT,
};
use arcana_core::status::JobStatus;
use serde::Serialize;
use tokio::time::Instant;

use crate::api::BackendError;
use crate::events::FailureKind;
use crate::messages::{PollResponse, VideoPayload};

/// Shown when the job never became visible to the status endpoint.
pub const NOT_FOUND_MESSAGE: &str =
    "The generation job could not be found. Please try the reveal again.";
/// Shown when the network kept failing while checking on the job.
pub const NETWORK_MESSAGE: &str =
    "Lost contact with the video service while checking on your reveal.";

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

/// Transient failure classes, each with its own budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    /// HTTP 404: the job is not visible yet.
    NotFound,
    /// HTTP 429 or 5xx.
    Http,
    /// No response at all, or an undecodable body.
    Network,
}

impl TransientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransientKind::NotFound => "not_found",
            TransientKind::Http => "http",
            TransientKind::Network => "network",
        }
    }
}

/// How many failures of each class are tolerated before the job fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudgets {
    pub not_found: u32,
    pub http: u32,
    pub network: u32,
    /// Whether a clean response also clears the not-found counter.
    pub reset_not_found_on_success: bool,
}

impl RetryBudgets {
    pub fn limit(&self, kind: TransientKind) -> u32 {
        match kind {
            TransientKind::NotFound => self.not_found,
            TransientKind::Http => self.http,
            TransientKind::Network => self.network,
        }
    }
}

impl Default for RetryBudgets {
    fn default() -> Self {
        Self {
            not_found: NOT_FOUND_RETRY_LIMIT,
            http: HTTP_RETRY_LIMIT,
            network: NETWORK_RETRY_LIMIT,
            reset_not_found_on_success: false,
        }
    }
}

// ---------------------------------------------------------------------------
// PollMeta
// ---------------------------------------------------------------------------

/// Per-job poll bookkeeping. Discarded with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollMeta {
    started_at: Instant,
    generic_error_count: u32,
    not_found_count: u32,
    http_error_count: u32,
}

impl PollMeta {
    pub fn new(started_at: Instant) -> Self {
        Self {
            started_at,
            generic_error_count: 0,
            not_found_count: 0,
            http_error_count: 0,
        }
    }

    /// Forget all counters and restart the clock.
    pub fn reset(&mut self, started_at: Instant) {
        *self = Self::new(started_at);
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }

    pub fn count(&self, kind: TransientKind) -> u32 {
        match kind {
            TransientKind::NotFound => self.not_found_count,
            TransientKind::Http => self.http_error_count,
            TransientKind::Network => self.generic_error_count,
        }
    }

    /// Charge one failure of `kind` and return the new count.
    pub fn record_failure(&mut self, kind: TransientKind) -> u32 {
        let counter = match kind {
            TransientKind::NotFound => &mut self.not_found_count,
            TransientKind::Http => &mut self.http_error_count,
            TransientKind::Network => &mut self.generic_error_count,
        };
        *counter += 1;
        *counter
    }

    /// A clean response: clear the transient network and HTTP counters.
    pub fn record_success(&mut self, budgets: &RetryBudgets) {
        self.generic_error_count = 0;
        self.http_error_count = 0;
        if budgets.reset_not_found_on_success {
            self.not_found_count = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What the scheduler should do with one poll result.
#[derive(Debug, Clone, PartialEq)]
pub enum PollVerdict {
    /// Transient failure within budget: keep polling as if processing.
    Retry { kind: TransientKind, attempt: u32 },
    /// Clean, non-terminal response.
    Running(JobStatus),
    /// Completed with a video.
    Completed(VideoPayload),
    /// Stop polling; the job failed.
    Failed { failure: FailureKind, message: String },
}

/// Map an HTTP status to its transient class, if it has one.
pub fn transient_kind_for_status(status: u16) -> Option<TransientKind> {
    match status {
        404 => Some(TransientKind::NotFound),
        429 | 500..=599 => Some(TransientKind::Http),
        _ => None,
    }
}

/// Classify one poll result, charging `meta` as a side effect.
pub fn classify(
    result: Result<PollResponse, BackendError>,
    meta: &mut PollMeta,
    budgets: &RetryBudgets,
) -> PollVerdict {
    let response = match result {
        Ok(response) => response,
        Err(BackendError::Http { status, message }) => {
            return match transient_kind_for_status(status) {
                Some(kind) => charge(kind, message, meta, budgets),
                None => PollVerdict::Failed {
                    failure: FailureKind::Terminal,
                    message,
                },
            };
        }
        Err(err @ (BackendError::Network(_) | BackendError::Decode(_))) => {
            return charge(TransientKind::Network, err.to_string(), meta, budgets);
        }
    };

    if response.errors.has_error() {
        return PollVerdict::Failed {
            failure: FailureKind::Terminal,
            message: response.errors.user_message(),
        };
    }

    meta.record_success(budgets);

    match response.normalized_status() {
        JobStatus::Completed => match response.payload() {
            Some(payload) => PollVerdict::Completed(payload),
            // A completed status without the video is a partial response.
            None => PollVerdict::Running(JobStatus::Processing),
        },
        JobStatus::Failed => PollVerdict::Failed {
            failure: FailureKind::Terminal,
            message: response.errors.user_message(),
        },
        status => PollVerdict::Running(status),
    }
}

fn charge(
    kind: TransientKind,
    detail: String,
    meta: &mut PollMeta,
    budgets: &RetryBudgets,
) -> PollVerdict {
    let attempt = meta.record_failure(kind);
    if attempt <= budgets.limit(kind) {
        return PollVerdict::Retry { kind, attempt };
    }

    let message = match kind {
        TransientKind::NotFound => NOT_FOUND_MESSAGE.to_string(),
        TransientKind::Network => NETWORK_MESSAGE.to_string(),
        TransientKind::Http if detail.trim().is_empty() => GENERIC_FAILURE_MESSAGE.to_string(),
        TransientKind::Http => detail,
    };
    PollVerdict::Failed {
        failure: FailureKind::BudgetExhausted(kind),
        message,
    }
}
