//! Timed status polling for one generation job.
//!
//! [`PollScheduler`] waits [`PollTiming::initial_delay`], then polls every
//! [`PollTiming::interval`] until the job resolves, the deadline passes, or
//! its [`TokenGuard`] goes stale. At most one poll is in flight at a time;
//! interval ticks that fire while a poll is outstanding are dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use arcana_core::generation::{
    GENERATION_DEADLINE, INITIAL_POLL_DELAY, POLL_INTERVAL, TIMEOUT_MESSAGE,
};
use arcana_core::status::JobStatus;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::api::{BackendError, GenerationBackend};
use crate::events::FailureKind;
use crate::messages::{PollResponse, VideoPayload};
use crate::retry::{classify, PollMeta, PollVerdict, RetryBudgets};
use crate::token::TokenGuard;

type PollFuture = Pin<Box<dyn Future<Output = Result<PollResponse, BackendError>> + Send>>;

/// Poll cadence and the hard deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Measured from [`PollMeta::started_at`].
    pub deadline: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_POLL_DELAY,
            interval: POLL_INTERVAL,
            deadline: GENERATION_DEADLINE,
        }
    }
}

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    AwaitingInitialDelay,
    Polling,
    Completed,
    Failed,
    Cancelled,
}

impl SchedulerState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SchedulerState::Completed | SchedulerState::Failed | SchedulerState::Cancelled
        )
    }
}

/// How a poll run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResolution {
    Completed(VideoPayload),
    Failed { failure: FailureKind, message: String },
    /// Cancelled or superseded. Nothing may be published for it.
    Cancelled,
}

enum Wake {
    Deadline,
    Tick,
    Response(Result<PollResponse, BackendError>),
}

/// Owns the timers, counters and in-flight request of one job's polling.
pub struct PollScheduler {
    backend: Arc<dyn GenerationBackend>,
    timing: PollTiming,
    budgets: RetryBudgets,
    meta: PollMeta,
    state: SchedulerState,
    status: JobStatus,
    ticker: Option<Interval>,
    in_flight: Option<PollFuture>,
    polls_issued: u32,
    ticks_dropped: u32,
}

impl PollScheduler {
    /// `started_at` anchors the deadline; pass the submission instant.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        timing: PollTiming,
        budgets: RetryBudgets,
        started_at: Instant,
    ) -> Self {
        Self {
            backend,
            timing,
            budgets,
            meta: PollMeta::new(started_at),
            state: SchedulerState::Idle,
            status: JobStatus::Pending,
            ticker: None,
            in_flight: None,
            polls_issued: 0,
            ticks_dropped: 0,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn meta(&self) -> &PollMeta {
        &self.meta
    }

    /// Most recent non-terminal status, never moving back to `Pending`.
    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn polls_issued(&self) -> u32 {
        self.polls_issued
    }

    /// Interval ticks dropped because a poll was still outstanding.
    pub fn ticks_dropped(&self) -> u32 {
        self.ticks_dropped
    }

    /// Arm the poll timer: first tick after the initial delay, then every
    /// interval.
    pub fn start(&mut self) {
        debug_assert!(self.ticker.is_none(), "poll timer already armed");
        debug_assert!(self.in_flight.is_none(), "poll already in flight");

        let first = Instant::now() + self.timing.initial_delay;
        let mut ticker = tokio::time::interval_at(first, self.timing.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        self.state = SchedulerState::AwaitingInitialDelay;
    }

    /// Drop the timer and any outstanding request, ending in `state`.
    pub fn stop(&mut self, state: SchedulerState) {
        self.ticker = None;
        self.in_flight = None;
        self.state = state;
    }

    /// Forget everything about the previous job and restart the clock.
    pub fn reset(&mut self, started_at: Instant) {
        self.stop(SchedulerState::Idle);
        self.meta.reset(started_at);
        self.status = JobStatus::Pending;
        self.polls_issued = 0;
        self.ticks_dropped = 0;
    }

    /// Poll `job_id` until it resolves.
    ///
    /// `on_status` is called after every non-terminal poll with the
    /// (monotonic) job status and the time elapsed since submission. It
    /// returns `false` when the update was rejected as stale, which ends the
    /// run as [`PollResolution::Cancelled`].
    pub async fn run<F>(&mut self, job_id: &str, guard: &TokenGuard, mut on_status: F) -> PollResolution
    where
        F: FnMut(&JobStatus, Duration) -> bool + Send,
    {
        self.start();
        let deadline_at = self.meta.started_at() + self.timing.deadline;

        loop {
            let wake = guard
                .suspend(Self::next_wake(
                    self.ticker.as_mut(),
                    self.in_flight.as_mut(),
                    deadline_at,
                ))
                .await;

            let Some(wake) = wake else {
                tracing::debug!(job_id, token = %guard.token(), "Polling abandoned");
                self.stop(SchedulerState::Cancelled);
                return PollResolution::Cancelled;
            };

            match wake {
                Wake::Deadline => return self.time_out(job_id),
                Wake::Tick => {
                    if self.in_flight.is_some() {
                        self.ticks_dropped += 1;
                        tracing::debug!(job_id, "Poll still outstanding, dropping tick");
                        continue;
                    }
                    if self.meta.elapsed(Instant::now()) >= self.timing.deadline {
                        return self.time_out(job_id);
                    }
                    self.issue_poll(job_id);
                }
                Wake::Response(result) => {
                    self.in_flight = None;
                    let verdict = classify(result, &mut self.meta, &self.budgets);
                    let status = match verdict {
                        PollVerdict::Completed(payload) => {
                            tracing::info!(job_id, polls = self.polls_issued, "Generation completed");
                            self.stop(SchedulerState::Completed);
                            return PollResolution::Completed(payload);
                        }
                        PollVerdict::Failed { failure, message } => {
                            tracing::warn!(job_id, ?failure, message = %message, "Generation failed");
                            self.stop(SchedulerState::Failed);
                            return PollResolution::Failed { failure, message };
                        }
                        PollVerdict::Retry { kind, attempt } => {
                            tracing::warn!(
                                job_id,
                                kind = kind.as_str(),
                                attempt,
                                limit = self.budgets.limit(kind),
                                "Transient poll failure, will retry",
                            );
                            JobStatus::Processing
                        }
                        PollVerdict::Running(status) => status,
                    };

                    self.advance(status);
                    let elapsed = self.meta.elapsed(Instant::now());
                    if !on_status(&self.status, elapsed) {
                        self.stop(SchedulerState::Cancelled);
                        return PollResolution::Cancelled;
                    }
                }
            }
        }
    }

    // ---- private helpers ----

    fn issue_poll(&mut self, job_id: &str) {
        debug_assert!(self.in_flight.is_none(), "single-flight violated");
        self.state = SchedulerState::Polling;
        self.polls_issued += 1;
        tracing::debug!(job_id, poll = self.polls_issued, "Polling generation status");

        let backend = Arc::clone(&self.backend);
        let job_id = job_id.to_string();
        self.in_flight = Some(Box::pin(async move { backend.poll(&job_id).await }));
    }

    /// Keep status monotonic: never step back to an earlier stage.
    fn advance(&mut self, status: JobStatus) {
        if status.stage() >= self.status.stage() {
            self.status = status;
        }
    }

    fn time_out(&mut self, job_id: &str) -> PollResolution {
        tracing::warn!(
            job_id,
            deadline_ms = self.timing.deadline.as_millis() as u64,
            polls = self.polls_issued,
            "Generation deadline exceeded",
        );
        self.stop(SchedulerState::Failed);
        PollResolution::Failed {
            failure: FailureKind::DeadlineExceeded,
            message: TIMEOUT_MESSAGE.to_string(),
        }
    }

    /// Wait for whichever comes first: the deadline, the outstanding poll's
    /// response, or the next interval tick.
    async fn next_wake(
        ticker: Option<&mut Interval>,
        in_flight: Option<&mut PollFuture>,
        deadline_at: Instant,
    ) -> Wake {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline_at) => Wake::Deadline,
            result = async {
                match in_flight {
                    Some(fut) => fut.await,
                    None => std::future::pending().await,
                }
            } => Wake::Response(result),
            _ = async {
                match ticker {
                    Some(ticker) => {
                        ticker.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => Wake::Tick,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::messages::{GenerateRequest, SubmitResponse};
    use crate::token::TokenManager;

    /// Replies to polls from a fixed script, each after an optional delay.
    struct Script {
        replies: Mutex<VecDeque<(Duration, Result<PollResponse, BackendError>)>>,
        polled_at: Mutex<Vec<Instant>>,
    }

    impl Script {
        fn new(replies: Vec<(Duration, Result<PollResponse, BackendError>)>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                polled_at: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationBackend for Script {
        async fn submit(&self, _: &GenerateRequest) -> Result<SubmitResponse, BackendError> {
            unreachable!("scheduler never submits")
        }

        async fn poll(&self, _: &str) -> Result<PollResponse, BackendError> {
            self.polled_at.lock().unwrap().push(Instant::now());
            let next = self.replies.lock().unwrap().pop_front();
            let (delay, reply) = next.unwrap_or((Duration::ZERO, Ok(status("processing"))));
            tokio::time::sleep(delay).await;
            reply
        }
    }

    fn status(s: &str) -> PollResponse {
        PollResponse {
            status: Some(s.to_string()),
            ..Default::default()
        }
    }

    fn guard() -> TokenGuard {
        let manager = Arc::new(TokenManager::new());
        let token = manager.next_token();
        TokenGuard::new(manager, token, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_initial_delay_then_interval() {
        let script = Script::new(vec![
            (Duration::ZERO, Ok(status("queued"))),
            (
                Duration::ZERO,
                Ok(PollResponse {
                    status: Some("completed".into()),
                    video: Some("v".into()),
                    ..Default::default()
                }),
            ),
        ]);
        let start = Instant::now();
        let mut scheduler =
            PollScheduler::new(script.clone(), PollTiming::default(), RetryBudgets::default(), start);

        let resolution = scheduler.run("job", &guard(), |_, _| true).await;

        assert_matches!(resolution, PollResolution::Completed(p) => assert_eq!(p.video, "v"));
        let offsets: Vec<_> = script
            .polled_at
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.duration_since(start))
            .collect();
        assert_eq!(offsets, vec![Duration::from_millis(2_500), Duration::from_millis(7_500)]);
        assert_eq!(scheduler.state(), SchedulerState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_drops_overlapping_ticks() {
        // First poll takes 12s: ticks at 7.5s and 12.5s fire while it is outstanding.
        let script = Script::new(vec![
            (Duration::from_secs(12), Ok(status("processing"))),
            (
                Duration::ZERO,
                Ok(PollResponse {
                    status: Some("completed".into()),
                    video: Some("v".into()),
                    ..Default::default()
                }),
            ),
        ]);
        let start = Instant::now();
        let mut scheduler =
            PollScheduler::new(script.clone(), PollTiming::default(), RetryBudgets::default(), start);

        let resolution = scheduler.run("job", &guard(), |_, _| true).await;

        assert_matches!(resolution, PollResolution::Completed(_));
        assert_eq!(scheduler.polls_issued(), 2);
        assert_eq!(scheduler.ticks_dropped(), 2);
        let second = script.polled_at.lock().unwrap()[1].duration_since(start);
        assert_eq!(second, Duration::from_millis(17_500));
    }

    #[tokio::test(start_paused = true)]
    async fn status_never_steps_back_to_pending() {
        let script = Script::new(vec![
            (Duration::ZERO, Ok(status("running"))),
            (Duration::ZERO, Ok(status("queued"))),
            (Duration::ZERO, Ok(status("failed"))),
        ]);
        let mut seen = Vec::new();
        let mut scheduler = PollScheduler::new(
            script,
            PollTiming::default(),
            RetryBudgets::default(),
            Instant::now(),
        );

        scheduler
            .run("job", &guard(), |status, _| {
                seen.push(status.clone());
                true
            })
            .await;

        assert_eq!(seen, vec![JobStatus::Processing, JobStatus::Processing]);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_update_ends_run() {
        let script = Script::new(vec![]);
        let mut scheduler = PollScheduler::new(
            script,
            PollTiming::default(),
            RetryBudgets::default(),
            Instant::now(),
        );

        let resolution = scheduler.run("job", &guard(), |_, _| false).await;

        assert_eq!(resolution, PollResolution::Cancelled);
        assert_eq!(scheduler.state(), SchedulerState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_counters_and_state() {
        let script = Script::new(vec![(
            Duration::ZERO,
            Err(BackendError::Http {
                status: 400,
                message: "bad".into(),
            }),
        )]);
        let mut scheduler = PollScheduler::new(
            script,
            PollTiming::default(),
            RetryBudgets::default(),
            Instant::now(),
        );
        let resolution = scheduler.run("job", &guard(), |_, _| true).await;
        assert_matches!(resolution, PollResolution::Failed { failure: FailureKind::Terminal, .. });

        let now = Instant::now();
        scheduler.reset(now);
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(scheduler.meta(), &PollMeta::new(now));
        assert_eq!(scheduler.polls_issued(), 0);
    }
}
