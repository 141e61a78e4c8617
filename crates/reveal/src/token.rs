//! Request identity tokens.
//!
//! Every submission (and every cancel) advances the controller's current
//! [`RequestToken`]. Async work captures the token it was started under and
//! must prove it is still current, through a [`TokenGuard`], after every
//! suspension point and before touching shared state. Anything else is a
//! stale continuation and is dropped without side effects.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Identity of one submission. Monotonically increasing; `0` means nothing
/// has been submitted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TokenManager
// ---------------------------------------------------------------------------

/// Issues tokens and decides which one is current.
///
/// Advancing the token and committing a state change both happen under the
/// same gate, so a commit can never interleave with a newer submission.
#[derive(Debug, Default)]
pub struct TokenManager {
    current: AtomicU64,
    gate: Mutex<()>,
    stale_discards: AtomicU64,
}

impl TokenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every outstanding token and return the new current one.
    pub fn next_token(&self) -> RequestToken {
        self.next_token_with(|_| ()).0
    }

    /// Advance the token and run `f` under the gate, before any continuation
    /// holding an older token can commit.
    pub fn next_token_with<R>(&self, f: impl FnOnce(RequestToken) -> R) -> (RequestToken, R) {
        let _gate = self.lock_gate();
        let token = RequestToken(self.current.fetch_add(1, Ordering::SeqCst) + 1);
        let out = f(token);
        (token, out)
    }

    pub fn current(&self) -> RequestToken {
        RequestToken(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.current() == token
    }

    /// Run `f` only if `token` is still current. Returns `None` and counts a
    /// discard otherwise.
    pub fn commit_if_current<R>(&self, token: RequestToken, f: impl FnOnce() -> R) -> Option<R> {
        let _gate = self.lock_gate();
        if !self.is_current(token) {
            self.record_discard(token);
            return None;
        }
        Some(f())
    }

    /// Number of continuations dropped because their token was stale.
    pub fn stale_discards(&self) -> u64 {
        self.stale_discards.load(Ordering::SeqCst)
    }

    fn record_discard(&self, token: RequestToken) {
        self.stale_discards.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(token = %token, current = %self.current(), "Discarding stale continuation");
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// TokenGuard
// ---------------------------------------------------------------------------

/// A captured token plus the cancellation signal of the job it belongs to.
///
/// The cancellation token wakes suspended work immediately; the request
/// token is re-checked on every resume regardless.
#[derive(Debug, Clone)]
pub struct TokenGuard {
    manager: Arc<TokenManager>,
    token: RequestToken,
    cancel: CancellationToken,
}

impl TokenGuard {
    pub fn new(manager: Arc<TokenManager>, token: RequestToken, cancel: CancellationToken) -> Self {
        Self {
            manager,
            token,
            cancel,
        }
    }

    pub fn token(&self) -> RequestToken {
        self.token
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Not cancelled and still the manager's current token.
    pub fn is_current(&self) -> bool {
        !self.cancel.is_cancelled() && self.manager.is_current(self.token)
    }

    /// Await `fut` unless the job is cancelled first.
    ///
    /// Returns `None` when cancelled while suspended, or when the token went
    /// stale by the time `fut` resolved. Callers must return without
    /// mutating anything on `None`.
    pub async fn suspend<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        };

        match output {
            Some(out) if self.is_current() => Some(out),
            _ => {
                self.manager.record_discard(self.token);
                None
            }
        }
    }

    /// Apply a state change if and only if this guard is still current.
    pub fn commit<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if self.cancel.is_cancelled() {
            self.manager.record_discard(self.token);
            return None;
        }
        self.manager.commit_if_current(self.token, f)
    }
}
