//! What the reveal controller publishes.
//!
//! [`DisplayState`] is the latest-value view a rendering layer draws from.
//! [`RevealEvent`] is the transition log other collaborators (audio cues,
//! the flip animation) subscribe to.

use arcana_core::status::JobStatus;
use arcana_core::types::Timestamp;
use serde::Serialize;

use crate::messages::VideoPayload;
use crate::retry::TransientKind;
use crate::token::RequestToken;

// ---------------------------------------------------------------------------
// Failure classes
// ---------------------------------------------------------------------------

/// Why a reveal ended in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The subject was invalid or the generation request was refused.
    Submission,
    /// The backend reported a failure that retrying will not fix.
    Terminal,
    /// A transient failure class recurred more often than its budget allows.
    BudgetExhausted(TransientKind),
    /// The job did not finish before the generation deadline.
    DeadlineExceeded,
}

// ---------------------------------------------------------------------------
// DisplayState
// ---------------------------------------------------------------------------

/// Outcome attached to a terminal display state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevealResult {
    Video(VideoPayload),
    Error { failure: FailureKind, message: String },
}

/// UI-facing snapshot of the current reveal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayState {
    /// `None` while idle: nothing submitted, or the last job was cancelled.
    pub status: Option<JobStatus>,
    /// 0-100. Never decreases while a job is running.
    pub progress: u8,
    pub result: Option<RevealResult>,
}

impl DisplayState {
    pub fn idle() -> Self {
        Self {
            status: None,
            progress: 0,
            result: None,
        }
    }

    pub fn running(status: JobStatus, progress: u8) -> Self {
        Self {
            status: Some(status),
            progress,
            result: None,
        }
    }

    pub fn completed(payload: VideoPayload) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: 100,
            result: Some(RevealResult::Video(payload)),
        }
    }

    pub fn failed(failure: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: 0,
            result: Some(RevealResult::Error {
                failure,
                message: message.into(),
            }),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status.is_none()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.as_ref().is_some_and(JobStatus::is_terminal)
    }

    pub fn video(&self) -> Option<&VideoPayload> {
        match &self.result {
            Some(RevealResult::Video(payload)) => Some(payload),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            Some(RevealResult::Error { message, .. }) => Some(message),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<FailureKind> {
        match &self.result {
            Some(RevealResult::Error { failure, .. }) => Some(*failure),
            _ => None,
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::idle()
    }
}

// ---------------------------------------------------------------------------
// RevealEvent
// ---------------------------------------------------------------------------

/// A lifecycle transition of one reveal.
#[derive(Debug, Clone, Serialize)]
pub enum RevealEvent {
    /// A subject was accepted and its generation request is being sent.
    Submitted {
        token: RequestToken,
        subject_key: String,
        at: Timestamp,
    },

    /// The backend started an asynchronous job.
    JobCreated { token: RequestToken, job_id: String },

    /// A poll moved the job's status or progress.
    Progress {
        token: RequestToken,
        job_id: String,
        status: JobStatus,
        progress: u8,
    },

    /// The video is ready. `job_id` is `None` for cache hits.
    Completed {
        token: RequestToken,
        job_id: Option<String>,
        payload: VideoPayload,
        at: Timestamp,
    },

    /// The reveal failed and will not recover without a new submission.
    Failed {
        token: RequestToken,
        job_id: Option<String>,
        failure: FailureKind,
        message: String,
        at: Timestamp,
    },

    /// The reveal was cancelled by the caller.
    Cancelled { token: RequestToken },
}

impl RevealEvent {
    pub fn token(&self) -> RequestToken {
        match self {
            RevealEvent::Submitted { token, .. }
            | RevealEvent::JobCreated { token, .. }
            | RevealEvent::Progress { token, .. }
            | RevealEvent::Completed { token, .. }
            | RevealEvent::Failed { token, .. }
            | RevealEvent::Cancelled { token } => *token,
        }
    }
}
