//! Reveal job controller.
//!
//! [`RevealController`] turns a [`Subject`] into a card video. Each
//! [`submit`](RevealController::submit) supersedes whatever was running,
//! captures a fresh [`RequestToken`], and spawns one task that sends the
//! generation request and, unless the backend answers from cache, hands the
//! job to a [`PollScheduler`].
//!
//! Progress is published as [`DisplayState`] through a
//! [`tokio::sync::watch`] channel; lifecycle transitions are broadcast as
//! [`RevealEvent`]s. Every publication goes through the job's
//! [`TokenGuard`], so a superseded or cancelled task can never overwrite
//! the state of its successor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arcana_core::error::CoreError;
use arcana_core::generation::TIMEOUT_MESSAGE;
use arcana_core::progress::estimate_progress_with_deadline;
use arcana_core::status::JobStatus;
use arcana_core::subject::Subject;
use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::api::{BackendError, GenerationApi, GenerationApiError, GenerationBackend};
use crate::config::RevealConfig;
use crate::events::{DisplayState, FailureKind, RevealEvent};
use crate::messages::{GenerateRequest, SubmitOutcome, VideoPayload};
use crate::scheduler::{PollResolution, PollScheduler};
use crate::token::{RequestToken, TokenGuard, TokenManager};

/// Broadcast channel capacity for reveal events.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long [`RevealController::shutdown`] waits for the job task to exit.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shown when the generation request never got an answer.
pub const UNREACHABLE_MESSAGE: &str = "Could not reach the video service. Please try again.";

/// Errors returned to callers of the controller.
#[derive(Debug, thiserror::Error)]
pub enum RevealError {
    /// The subject failed validation. A failed display state was published.
    #[error("Invalid subject: {0}")]
    InvalidSubject(#[from] CoreError),

    /// `submit` was called outside a Tokio runtime.
    #[error("Reveal controller requires a Tokio runtime")]
    NoRuntime,

    #[error(transparent)]
    Api(#[from] GenerationApiError),
}

/// The job task currently owned by the controller.
struct ActiveJob {
    token: RequestToken,
    subject_key: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Submits reveals, supervises their polling, and publishes their state.
pub struct RevealController {
    backend: Arc<dyn GenerationBackend>,
    config: Arc<RevealConfig>,
    tokens: Arc<TokenManager>,
    display_tx: Arc<watch::Sender<DisplayState>>,
    event_tx: broadcast::Sender<RevealEvent>,
    active: Mutex<Option<ActiveJob>>,
}

impl RevealController {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: RevealConfig) -> Self {
        let (display_tx, _) = watch::channel(DisplayState::idle());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            backend,
            config: Arc::new(config),
            tokens: Arc::new(TokenManager::new()),
            display_tx: Arc::new(display_tx),
            event_tx,
            active: Mutex::new(None),
        }
    }

    /// Build a controller talking HTTP to `config.api_url`.
    pub fn from_config(config: RevealConfig) -> Result<Self, RevealError> {
        let api = GenerationApi::new(config.api_url.clone(), config.request_timeout)?;
        Ok(Self::new(Arc::new(api), config))
    }

    pub fn config(&self) -> &RevealConfig {
        &self.config
    }

    /// Latest display state.
    pub fn display(&self) -> DisplayState {
        self.display_tx.borrow().clone()
    }

    /// Watch display state changes.
    pub fn subscribe_display(&self) -> watch::Receiver<DisplayState> {
        self.display_tx.subscribe()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RevealEvent> {
        self.event_tx.subscribe()
    }

    pub fn current_token(&self) -> RequestToken {
        self.tokens.current()
    }

    /// Continuations dropped because their token went stale.
    pub fn stale_discards(&self) -> u64 {
        self.tokens.stale_discards()
    }

    /// Identity key of the subject owning the current job, if any.
    pub fn active_subject_key(&self) -> Option<String> {
        self.lock_active().as_ref().map(|job| job.subject_key.clone())
    }

    /// True while a job task is still running.
    pub fn is_active(&self) -> bool {
        self.lock_active()
            .as_ref()
            .is_some_and(|job| !job.handle.is_finished())
    }

    /// Start a reveal for `subject`, superseding any job in flight.
    ///
    /// Never deduplicates: submitting the same subject twice starts two
    /// lifecycles, and only the second may publish. An invalid subject still
    /// supersedes the previous job, publishes a failed state, and returns
    /// [`RevealError::InvalidSubject`].
    pub fn submit(&self, subject: Subject) -> Result<RequestToken, RevealError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RevealError::NoRuntime)?;
        let subject_key = subject.identity_key();

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            tracing::info!(
                token = %previous.token,
                subject = %previous.subject_key,
                "Superseding reveal in flight",
            );
            previous.cancel.cancel();
        }
        debug_assert!(active.is_none(), "previous job still registered");

        if let Err(e) = subject.ensure_valid() {
            let message = e.to_string();
            let (token, ()) = self.tokens.next_token_with(|token| {
                self.display_tx
                    .send_replace(DisplayState::failed(FailureKind::Submission, message.clone()));
                let _ = self.event_tx.send(RevealEvent::Failed {
                    token,
                    job_id: None,
                    failure: FailureKind::Submission,
                    message: message.clone(),
                    at: Utc::now(),
                });
            });
            tracing::warn!(token = %token, subject = %subject_key, error = %e, "Rejected invalid subject");
            return Err(RevealError::InvalidSubject(e));
        }

        let started_at = Instant::now();
        let initial_progress = estimate_progress_with_deadline(
            &JobStatus::Pending,
            None,
            self.config.timing.deadline,
        );
        let (token, ()) = self.tokens.next_token_with(|token| {
            self.display_tx
                .send_replace(DisplayState::running(JobStatus::Pending, initial_progress));
            let _ = self.event_tx.send(RevealEvent::Submitted {
                token,
                subject_key: subject_key.clone(),
                at: Utc::now(),
            });
        });

        tracing::info!(token = %token, subject = %subject_key, "Reveal submitted");

        let cancel = CancellationToken::new();
        let job = JobContext {
            guard: TokenGuard::new(Arc::clone(&self.tokens), token, cancel.clone()),
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            display_tx: Arc::clone(&self.display_tx),
            event_tx: self.event_tx.clone(),
            started_at,
            job_id: None,
            progress: initial_progress,
        };
        let handle = runtime.spawn(run_job(job, subject));

        *active = Some(ActiveJob {
            token,
            subject_key,
            cancel,
            handle,
        });

        Ok(token)
    }

    /// Stop the current reveal and return to idle.
    ///
    /// Timers stop immediately. A response still in flight is discarded when
    /// it lands. Calling this again, or with nothing submitted, does nothing.
    pub fn cancel(&self) {
        let _ = self.take_and_invalidate();
    }

    /// Cancel the current reveal and wait for its task to exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down reveal controller");
        if let Some(handle) = self.take_and_invalidate() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                tracing::warn!("Reveal task did not exit before shutdown timeout");
            }
        }
    }

    /// Wait until the display reaches a terminal or idle state and return it.
    pub async fn wait_until_settled(&self) -> DisplayState {
        let mut rx = self.subscribe_display();
        let settled = rx
            .wait_for(|state| state.is_terminal() || state.is_idle())
            .await
            .map(|state| state.clone());
        // The sender lives as long as `self`, so the channel cannot close here.
        settled.unwrap_or_else(|_| self.display())
    }

    // ---- private helpers ----

    fn take_and_invalidate(&self) -> Option<JoinHandle<()>> {
        let mut active = self.lock_active();
        let previous = active.take();

        if previous.is_none() && self.display_tx.borrow().is_idle() {
            return None;
        }

        if let Some(job) = &previous {
            job.cancel.cancel();
        }

        let (token, ()) = self.tokens.next_token_with(|token| {
            self.display_tx.send_replace(DisplayState::idle());
            let _ = self.event_tx.send(RevealEvent::Cancelled { token });
        });
        tracing::info!(token = %token, "Reveal cancelled");

        previous.map(|job| job.handle)
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveJob>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RevealController {
    fn drop(&mut self) {
        if let Some(job) = self.lock_active().take() {
            job.cancel.cancel();
        }
    }
}

// ---------------------------------------------------------------------------
// Job task
// ---------------------------------------------------------------------------

/// Everything one job task needs. Publication is gated by `guard`.
struct JobContext {
    guard: TokenGuard,
    backend: Arc<dyn GenerationBackend>,
    config: Arc<RevealConfig>,
    display_tx: Arc<watch::Sender<DisplayState>>,
    event_tx: broadcast::Sender<RevealEvent>,
    started_at: Instant,
    job_id: Option<String>,
    /// Highest progress published so far.
    progress: u8,
}

impl JobContext {
    fn job_created(&mut self, job_id: &str) -> bool {
        self.job_id = Some(job_id.to_string());
        let token = self.guard.token();
        let progress = self.progress;
        self.guard
            .commit(|| {
                self.display_tx
                    .send_replace(DisplayState::running(JobStatus::Pending, progress));
                let _ = self.event_tx.send(RevealEvent::JobCreated {
                    token,
                    job_id: job_id.to_string(),
                });
            })
            .is_some()
    }

    /// Publish a non-terminal status. Progress never decreases.
    fn running(&mut self, status: &JobStatus, elapsed: Duration) -> bool {
        let estimate =
            estimate_progress_with_deadline(status, Some(elapsed), self.config.timing.deadline);
        let progress = self.progress.max(estimate);
        let token = self.guard.token();
        let job_id = self.job_id.clone().unwrap_or_default();

        let committed = self
            .guard
            .commit(|| {
                self.display_tx
                    .send_replace(DisplayState::running(status.clone(), progress));
                let _ = self.event_tx.send(RevealEvent::Progress {
                    token,
                    job_id,
                    status: status.clone(),
                    progress,
                });
            })
            .is_some();

        if committed {
            self.progress = progress;
        }
        committed
    }

    fn complete(&mut self, payload: VideoPayload) {
        let token = self.guard.token();
        let job_id = self.job_id.clone();
        let committed = self.guard.commit(|| {
            self.display_tx
                .send_replace(DisplayState::completed(payload.clone()));
            let _ = self.event_tx.send(RevealEvent::Completed {
                token,
                job_id,
                payload,
                at: Utc::now(),
            });
        });
        if committed.is_some() {
            tracing::info!(token = %token, job_id = ?self.job_id, "Reveal completed");
        }
    }

    fn fail(&mut self, failure: FailureKind, message: String) {
        let token = self.guard.token();
        let job_id = self.job_id.clone();
        let committed = self.guard.commit(|| {
            self.display_tx
                .send_replace(DisplayState::failed(failure, message.clone()));
            let _ = self.event_tx.send(RevealEvent::Failed {
                token,
                job_id,
                failure,
                message: message.clone(),
                at: Utc::now(),
            });
        });
        if committed.is_some() {
            tracing::warn!(token = %token, job_id = ?self.job_id, ?failure, message = %message, "Reveal failed");
        }
    }
}

/// Submit, then poll if needed, then publish the outcome.
async fn run_job(mut job: JobContext, subject: Subject) {
    let request = GenerateRequest::from_subject(&subject, &job.config.style, job.config.seconds);
    let deadline_at = job.started_at + job.config.timing.deadline;

    let backend = Arc::clone(&job.backend);
    let submitted = job
        .guard
        .suspend(tokio::time::timeout_at(deadline_at, async move {
            backend.submit(&request).await
        }))
        .await;

    let outcome = match submitted {
        None => return,
        Some(Err(_elapsed)) => {
            job.fail(FailureKind::DeadlineExceeded, TIMEOUT_MESSAGE.to_string());
            return;
        }
        Some(Ok(Err(e))) => {
            tracing::warn!(token = %job.guard.token(), error = %e, "Generation request failed");
            job.fail(FailureKind::Submission, submission_message(&e));
            return;
        }
        Some(Ok(Ok(response))) => response.into_outcome(),
    };

    let job_id = match outcome {
        SubmitOutcome::Cached(payload) => {
            tracing::info!(token = %job.guard.token(), cache_key = ?payload.cache_key, "Served from cache");
            job.complete(payload);
            return;
        }
        SubmitOutcome::Rejected(message) => {
            job.fail(FailureKind::Submission, message);
            return;
        }
        SubmitOutcome::Started { job_id } => job_id,
    };

    tracing::info!(token = %job.guard.token(), job_id = %job_id, "Generation job started");
    if !job.job_created(&job_id) {
        return;
    }

    let mut scheduler = PollScheduler::new(
        Arc::clone(&job.backend),
        job.config.timing,
        job.config.budgets,
        job.started_at,
    );
    let guard = job.guard.clone();
    let resolution = scheduler
        .run(&job_id, &guard, |status, elapsed| job.running(status, elapsed))
        .await;

    match resolution {
        PollResolution::Completed(payload) => job.complete(payload),
        PollResolution::Failed { failure, message } => job.fail(failure, message),
        PollResolution::Cancelled => {}
    }
}

fn submission_message(err: &BackendError) -> String {
    match err {
        BackendError::Http { message, .. } => message.clone(),
        BackendError::Network(_) | BackendError::Decode(_) => UNREACHABLE_MESSAGE.to_string(),
    }
}
