//! Heuristic progress for generation jobs.
//!
//! The backend does not report fractional progress, so the display value
//! is derived from the normalized status and the time spent so far. The
//! estimate for a running job stops at [`MAX_RUNNING_PROGRESS`]; only the
//! terminal transition reaches 100.
//!
//! The estimator has no memory. Callers that render the value must keep
//! the maximum of the previous and the new estimate.

use std::time::Duration;

use crate::generation::GENERATION_DEADLINE;
use crate::status::JobStatus;

/// Ceiling for any non-terminal estimate.
pub const MAX_RUNNING_PROGRESS: u8 = 95;

/// Band for `Pending`: starts at 12, grows by up to 30.
const PENDING_BASE: f64 = 12.0;
const PENDING_RANGE: f64 = 30.0;

/// Band for `Processing` and unknown statuses: starts at 36, grows by up to 54.
const PROCESSING_BASE: f64 = 36.0;
const PROCESSING_RANGE: f64 = 54.0;

/// Estimate progress against the default [`GENERATION_DEADLINE`].
pub fn estimate_progress(status: &JobStatus, elapsed: Option<Duration>) -> u8 {
    estimate_progress_with_deadline(status, elapsed, GENERATION_DEADLINE)
}

/// Estimate display progress (0-100) from status and elapsed time.
///
/// `elapsed` of `None` means the job has not started its clock, which is
/// treated as zero elapsed time.
pub fn estimate_progress_with_deadline(
    status: &JobStatus,
    elapsed: Option<Duration>,
    deadline: Duration,
) -> u8 {
    let (base, range) = match status {
        JobStatus::Completed => return 100,
        JobStatus::Failed => return 0,
        JobStatus::Pending => (PENDING_BASE, PENDING_RANGE),
        JobStatus::Processing | JobStatus::Other(_) => (PROCESSING_BASE, PROCESSING_RANGE),
    };

    let ratio = match elapsed {
        Some(elapsed) if !deadline.is_zero() => {
            elapsed.min(deadline).as_secs_f64() / deadline.as_secs_f64()
        }
        _ => 0.0,
    };

    let value = (base + range * ratio).round();
    (value as u8).min(MAX_RUNNING_PROGRESS)
}
