//! Wire types for the card video generation endpoints.
//!
//! `POST /api/generate-card-video` either answers from cache with a finished
//! video or starts an asynchronous job and returns its `jobId`.
//! `GET /api/generate-card-video?jobId=<id>` reports the job's status.
//! Field names on the wire are camelCase.

use arcana_core::generation::{join_error_parts, GENERIC_FAILURE_MESSAGE};
use arcana_core::status::{normalize, JobStatus};
use arcana_core::subject::Subject;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Card description as the generator expects it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub name: String,
    pub reversed: bool,
    pub number: Option<u32>,
    pub suit: Option<String>,
    pub rank: Option<String>,
    pub rank_value: Option<u32>,
    pub meaning: Option<String>,
}

/// Body of the generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    pub card: CardPayload,
    pub question: String,
    pub position: String,
    pub style: String,
    pub seconds: u32,
}

impl GenerateRequest {
    pub fn from_subject(subject: &Subject, style: &str, seconds: u32) -> Self {
        let card = &subject.card;
        Self {
            card: CardPayload {
                name: card.name.trim().to_string(),
                reversed: subject.orientation.is_reversed(),
                number: card.number,
                suit: card.suit.clone(),
                rank: card.rank.clone(),
                rank_value: card.rank_value,
                meaning: card.meaning.clone(),
            },
            question: subject.question.trim().to_string(),
            position: subject.position.trim().to_string(),
            style: style.to_string(),
            seconds,
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A finished card video plus the cache metadata the backend attached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPayload {
    /// Opaque video reference (URL or data URI); never inspected here.
    pub video: String,
    pub cache_key: Option<String>,
    pub style: Option<String>,
    pub seconds: Option<f64>,
}

// ---------------------------------------------------------------------------
// Error fields shared by both responses
// ---------------------------------------------------------------------------

/// The free-text error fields a response body may carry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorFields {
    pub error: Option<String>,
    pub details: Option<String>,
    pub hint: Option<String>,
    pub message: Option<String>,
}

impl ErrorFields {
    /// True when the body carries an explicit, non-blank `error`.
    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// `error`, `details` and `hint` joined with spaces, then `message`,
    /// then the generic failure text.
    pub fn user_message(&self) -> String {
        join_error_parts([
            self.error.as_deref(),
            self.details.as_deref(),
            self.hint.as_deref(),
        ])
        .or_else(|| join_error_parts([self.message.as_deref()]))
        .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

// ---------------------------------------------------------------------------
// Submit response
// ---------------------------------------------------------------------------

/// Raw body of a 2xx generation response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: Option<String>,
    pub status: Option<String>,
    pub video: Option<String>,
    pub cache_key: Option<String>,
    pub style: Option<String>,
    pub seconds: Option<f64>,
    #[serde(flatten)]
    pub errors: ErrorFields,
}

/// What a 2xx generation response means for the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Cache hit: the video is ready and no job was created.
    Cached(VideoPayload),
    /// A job was started and must be polled.
    Started { job_id: String },
    /// The body reported an error or carried neither a video nor a job.
    Rejected(String),
}

impl SubmitResponse {
    pub fn into_outcome(self) -> SubmitOutcome {
        if self.errors.has_error() {
            return SubmitOutcome::Rejected(self.errors.user_message());
        }

        if normalize(self.status.as_deref()) == JobStatus::Completed {
            if let Some(video) = self.video.filter(|v| !v.is_empty()) {
                return SubmitOutcome::Cached(VideoPayload {
                    video,
                    cache_key: self.cache_key,
                    style: self.style,
                    seconds: self.seconds,
                });
            }
        }

        match self.job_id.filter(|id| !id.trim().is_empty()) {
            Some(job_id) => SubmitOutcome::Started { job_id },
            None => SubmitOutcome::Rejected(
                join_error_parts([self.errors.message.as_deref()])
                    .unwrap_or_else(|| "The generator did not return a video or a job.".to_string()),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Poll response
// ---------------------------------------------------------------------------

/// Raw body of a 2xx job status response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub status: Option<String>,
    pub video: Option<String>,
    pub cache_key: Option<String>,
    pub style: Option<String>,
    pub seconds: Option<f64>,
    #[serde(flatten)]
    pub errors: ErrorFields,
}

impl PollResponse {
    pub fn normalized_status(&self) -> JobStatus {
        normalize(self.status.as_deref())
    }

    /// The finished video, if the body carries a non-empty one.
    pub fn payload(&self) -> Option<VideoPayload> {
        let video = self.video.as_deref().filter(|v| !v.is_empty())?;
        Some(VideoPayload {
            video: video.to_string(),
            cache_key: self.cache_key.clone(),
            style: self.style.clone(),
            seconds: self.seconds,
        })
    }
}

#[cfg(test)]
mod tests {
    use arcana_core::subject::{Card, Orientation};
    use assert_matches::assert_matches;

    use super::*;

    fn submit(json: serde_json::Value) -> SubmitOutcome {
        serde_json::from_value::<SubmitResponse>(json)
            .expect("valid submit body")
            .into_outcome()
    }

    #[test]
    fn request_serializes_camel_case_card() {
        let mut card = Card::named("Queen of Swords");
        card.suit = Some("swords".into());
        card.rank = Some("Queen".into());
        card.rank_value = Some(12);
        let subject = Subject::new(card, Orientation::Reversed, " present ", "What now?");

        let body = serde_json::to_value(GenerateRequest::from_subject(&subject, "cinematic", 5))
            .unwrap();

        assert_eq!(body["card"]["name"], "Queen of Swords");
        assert_eq!(body["card"]["reversed"], true);
        assert_eq!(body["card"]["rankValue"], 12);
        assert_eq!(body["position"], "present");
        assert_eq!(body["style"], "cinematic");
        assert_eq!(body["seconds"], 5);
    }

    #[test]
    fn cache_hit_yields_payload() {
        let outcome = submit(serde_json::json!({
            "status": "completed",
            "video": "https://cdn/tower.mp4",
            "cacheKey": "tower-rev",
            "seconds": 5,
        }));
        assert_matches!(outcome, SubmitOutcome::Cached(p) => {
            assert_eq!(p.video, "https://cdn/tower.mp4");
            assert_eq!(p.cache_key.as_deref(), Some("tower-rev"));
            assert_eq!(p.seconds, Some(5.0));
        });
    }

    #[test]
    fn job_id_starts_polling() {
        assert_eq!(
            submit(serde_json::json!({ "jobId": "abc" })),
            SubmitOutcome::Started { job_id: "abc".into() }
        );
    }

    #[test]
    fn error_field_rejects_even_with_job_id() {
        let outcome = submit(serde_json::json!({
            "jobId": "abc",
            "error": "Quota exceeded.",
            "hint": "Upgrade your plan.",
        }));
        assert_eq!(outcome, SubmitOutcome::Rejected("Quota exceeded. Upgrade your plan.".into()));
    }

    #[test]
    fn completed_without_video_falls_back_to_job() {
        let outcome = submit(serde_json::json!({ "status": "completed", "jobId": "j1" }));
        assert_eq!(outcome, SubmitOutcome::Started { job_id: "j1".into() });
    }

    #[test]
    fn empty_body_is_rejected() {
        assert_matches!(submit(serde_json::json!({})), SubmitOutcome::Rejected(_));
    }

    #[test]
    fn user_message_prefers_error_parts_then_message() {
        let fields = ErrorFields {
            error: None,
            details: Some("Model overloaded.".into()),
            hint: None,
            message: Some("ignored".into()),
        };
        assert_eq!(fields.user_message(), "Model overloaded.");

        let fields = ErrorFields {
            message: Some("Job expired.".into()),
            ..Default::default()
        };
        assert_eq!(fields.user_message(), "Job expired.");

        assert_eq!(ErrorFields::default().user_message(), GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn poll_payload_requires_non_empty_video() {
        let body: PollResponse =
            serde_json::from_value(serde_json::json!({ "status": "completed", "video": "" }))
                .unwrap();
        assert_eq!(body.normalized_status(), JobStatus::Completed);
        assert!(body.payload().is_none());
    }
}
