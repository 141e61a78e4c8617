#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arcana_core::subject::{Card, Orientation, Subject};
use arcana_reveal::api::{BackendError, GenerationBackend};
use arcana_reveal::config::RevealConfig;
use arcana_reveal::controller::RevealController;
use arcana_reveal::messages::{GenerateRequest, PollResponse, SubmitResponse};
use async_trait::async_trait;
use tokio::time::Instant;

/// One scripted reply: how long the backend takes, then what it answers.
pub type Step<T> = (Duration, Result<T, BackendError>);

/// In-memory generation backend replaying scripted replies.
///
/// Submits and polls each pop from their own queue. Once the poll queue is
/// empty every poll answers `processing` immediately.
#[derive(Default)]
pub struct FakeBackend {
    submits: Mutex<VecDeque<Step<SubmitResponse>>>,
    polls: Mutex<VecDeque<Step<PollResponse>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    polled: Mutex<Vec<(String, Instant)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on_submit(self: &Arc<Self>, delay: Duration, reply: Result<SubmitResponse, BackendError>) -> Arc<Self> {
        self.submits.lock().unwrap().push_back((delay, reply));
        Arc::clone(self)
    }

    pub fn on_poll(self: &Arc<Self>, delay: Duration, reply: Result<PollResponse, BackendError>) -> Arc<Self> {
        self.polls.lock().unwrap().push_back((delay, reply));
        Arc::clone(self)
    }

    /// Queue the same immediate poll reply `n` times.
    pub fn on_polls(self: &Arc<Self>, n: usize, reply: Result<PollResponse, BackendError>) -> Arc<Self> {
        for _ in 0..n {
            self.on_poll(Duration::ZERO, reply.clone());
        }
        Arc::clone(self)
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polled.lock().unwrap().len()
    }

    /// Offsets of every poll from `start`.
    pub fn poll_offsets(&self, start: Instant) -> Vec<Duration> {
        self.polled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| at.duration_since(start))
            .collect()
    }

    pub fn polled_jobs(&self) -> Vec<String> {
        self.polled
            .lock()
            .unwrap()
            .iter()
            .map(|(job, _)| job.clone())
            .collect()
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, BackendError> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.submits.lock().unwrap().pop_front();
        let (delay, reply) = step.unwrap_or((Duration::ZERO, Ok(started("job-default"))));
        tokio::time::sleep(delay).await;
        reply
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, BackendError> {
        self.polled
            .lock()
            .unwrap()
            .push((job_id.to_string(), Instant::now()));
        let step = self.polls.lock().unwrap().pop_front();
        let (delay, reply) = step.unwrap_or((Duration::ZERO, Ok(status("processing"))));
        tokio::time::sleep(delay).await;
        reply
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn controller(backend: Arc<FakeBackend>) -> RevealController {
    RevealController::new(backend, RevealConfig::default())
}

pub fn tower() -> Subject {
    let mut card = Card::named("The Tower");
    card.number = Some(16);
    card.rank_value = Some(16);
    Subject::new(card, Orientation::Reversed, "outcome", "Should I move?")
}

pub fn star() -> Subject {
    Subject::new(Card::named("The Star"), Orientation::Upright, "future", "Will it heal?")
}

pub fn started(job_id: &str) -> SubmitResponse {
    SubmitResponse {
        job_id: Some(job_id.to_string()),
        status: Some("pending".to_string()),
        ..Default::default()
    }
}

pub fn cached(video: &str) -> SubmitResponse {
    SubmitResponse {
        status: Some("completed".to_string()),
        video: Some(video.to_string()),
        cache_key: Some("tower-reversed".to_string()),
        ..Default::default()
    }
}

pub fn status(s: &str) -> PollResponse {
    PollResponse {
        status: Some(s.to_string()),
        ..Default::default()
    }
}

pub fn completed(video: &str) -> PollResponse {
    PollResponse {
        status: Some("completed".to_string()),
        video: Some(video.to_string()),
        ..Default::default()
    }
}

pub fn http(status: u16) -> BackendError {
    BackendError::Http {
        status,
        message: format!("HTTP {status}"),
    }
}

pub fn network() -> BackendError {
    BackendError::Network("connection refused".to_string())
}

/// Let spawned tasks run until they block on a timer.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}
