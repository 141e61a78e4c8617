//! Upstream job status vocabulary.
//!
//! The generation backend reports free-text statuses that vary between
//! providers and versions. [`normalize`] collapses them into [`JobStatus`].

use serde::{Serialize, Serializer};

/// Raw statuses meaning "accepted, not started".
pub const PENDING_SYNONYMS: &[&str] = &["pending", "queued", "submitted"];
/// Raw statuses meaning "running".
pub const PROCESSING_SYNONYMS: &[&str] = &["processing", "running", "in_progress"];
/// Raw statuses meaning "finished successfully".
pub const COMPLETED_SYNONYMS: &[&str] = &["completed", "succeeded"];
/// Raw statuses meaning "will never finish".
pub const FAILED_SYNONYMS: &[&str] = &["failed", "cancelled", "expired"];

/// Normalized generation job status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// A status this client does not know yet, lower-cased. Never terminal.
    Other(String),
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Other(raw) => raw,
        }
    }

    /// Only `Completed` and `Failed` end a job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Ordering rank used to keep transitions monotonic within one job.
    ///
    /// Unknown statuses rank with `Processing`.
    pub fn stage(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing | JobStatus::Other(_) => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Map a raw upstream status onto [`JobStatus`].
///
/// Absent or blank input is read as `Processing` so a job never shows an
/// "unknown" state while the backend is still warming up.
pub fn normalize(raw: Option<&str>) -> JobStatus {
    let value = raw.map(|s| s.trim().to_lowercase()).unwrap_or_default();
    if value.is_empty() {
        return JobStatus::Processing;
    }

    let value_ref = value.as_str();
    if PENDING_SYNONYMS.contains(&value_ref) {
        JobStatus::Pending
    } else if PROCESSING_SYNONYMS.contains(&value_ref) {
        JobStatus::Processing
    } else if COMPLETED_SYNONYMS.contains(&value_ref) {
        JobStatus::Completed
    } else if FAILED_SYNONYMS.contains(&value_ref) {
        JobStatus::Failed
    } else {
        JobStatus::Other(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonym_table_maps_to_canonical_values() {
        for raw in PENDING_SYNONYMS {
            assert_eq!(normalize(Some(raw)), JobStatus::Pending, "{raw}");
        }
        for raw in PROCESSING_SYNONYMS {
            assert_eq!(normalize(Some(raw)), JobStatus::Processing, "{raw}");
        }
        for raw in COMPLETED_SYNONYMS {
            assert_eq!(normalize(Some(raw)), JobStatus::Completed, "{raw}");
        }
        for raw in FAILED_SYNONYMS {
            assert_eq!(normalize(Some(raw)), JobStatus::Failed, "{raw}");
        }
    }

    #[test]
    fn absent_and_blank_default_to_processing() {
        assert_eq!(normalize(None), JobStatus::Processing);
        assert_eq!(normalize(Some("")), JobStatus::Processing);
        assert_eq!(normalize(Some("   ")), JobStatus::Processing);
    }

    #[test]
    fn input_is_trimmed_and_case_folded() {
        assert_eq!(normalize(Some("  SUCCEEDED ")), JobStatus::Completed);
        assert_eq!(normalize(Some("In_Progress")), JobStatus::Processing);
    }

    #[test]
    fn unknown_values_pass_through_lowercased() {
        let status = normalize(Some("Upscaling"));
        assert_eq!(status, JobStatus::Other("upscaling".to_string()));
        assert!(!status.is_terminal());
        assert_eq!(status.as_str(), "upscaling");
    }

    #[test]
    fn only_completed_and_failed_are_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_value(JobStatus::Other("upscaling".into())).unwrap();
        assert_eq!(json, serde_json::json!("upscaling"));
        let json = serde_json::to_value(JobStatus::Completed).unwrap();
        assert_eq!(json, serde_json::json!("completed"));
    }
}
