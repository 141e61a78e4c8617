//! Card video generation timing, retry budgets, and request validation.
//!
//! These are the defaults the reveal controller runs with when no
//! configuration overrides them.

use std::time::Duration;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Poll timing
// ---------------------------------------------------------------------------

/// Wait before the first status poll. Freshly created jobs predictably have
/// not started yet.
pub const INITIAL_POLL_DELAY: Duration = Duration::from_millis(2_500);
/// Interval between status polls after the first one.
pub const POLL_INTERVAL: Duration = Duration::from_millis(5_000);
/// Hard wall-clock limit for a single generation, measured from submission.
pub const GENERATION_DEADLINE: Duration = Duration::from_millis(120_000);

// ---------------------------------------------------------------------------
// Retry budgets
// ---------------------------------------------------------------------------

/// Tolerated HTTP 404 poll responses (job not visible yet).
pub const NOT_FOUND_RETRY_LIMIT: u32 = 4;
/// Tolerated HTTP 429 / 5xx poll responses.
pub const HTTP_RETRY_LIMIT: u32 = 3;
/// Tolerated network-level poll failures.
pub const NETWORK_RETRY_LIMIT: u32 = 2;

// ---------------------------------------------------------------------------
// Request defaults
// ---------------------------------------------------------------------------

/// Visual style requested when the caller does not pick one.
pub const DEFAULT_STYLE: &str = "cinematic";
/// Clip length requested when the caller does not pick one.
pub const DEFAULT_CLIP_SECONDS: u32 = 5;
/// Shortest clip the backend accepts.
pub const MIN_CLIP_SECONDS: u32 = 1;
/// Longest clip the backend accepts.
pub const MAX_CLIP_SECONDS: u32 = 30;

// ---------------------------------------------------------------------------
// User-facing messages
// ---------------------------------------------------------------------------

/// Shown when generation did not finish before [`GENERATION_DEADLINE`].
pub const TIMEOUT_MESSAGE: &str =
    "Video generation timed out. The card is still yours; try the reveal again.";
/// Fallback when the backend reports a failure without any detail.
pub const GENERIC_FAILURE_MESSAGE: &str = "Video generation failed. Please try again.";

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate a requested clip length against the backend's accepted range.
pub fn validate_clip_seconds(seconds: u32) -> Result<(), CoreError> {
    if (MIN_CLIP_SECONDS..=MAX_CLIP_SECONDS).contains(&seconds) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Clip length must be between {MIN_CLIP_SECONDS} and {MAX_CLIP_SECONDS} seconds, got {seconds}"
        )))
    }
}

/// Validate that a style name is present.
pub fn validate_style(style: &str) -> Result<(), CoreError> {
    if style.trim().is_empty() {
        return Err(CoreError::Validation("Style must not be empty".to_string()));
    }
    Ok(())
}

/// Join the non-empty parts of a backend error body into one sentence.
///
/// Parts are trimmed and joined with single spaces. Returns `None` when
/// every part is absent or blank so callers can pick their own fallback.
pub fn join_error_parts<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let joined = parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
