//! Creation records: one per generation attempt, kept per user.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreationStatus {
    /// Accepted and charged, generation not started
    #[default]
    Pending,
    /// Handed to the generation backend
    Queued,
    /// Generation in progress
    Processing,
    /// Output finalized and stored
    Done,
    /// Generation or finalization failed
    Failed,
}

impl CreationStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationStatus::Pending => "pending",
            CreationStatus::Queued => "queued",
            CreationStatus::Processing => "processing",
            CreationStatus::Done => "done",
            CreationStatus::Failed => "failed",
        }
    }

    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CreationStatus::Pending),
            "queued" => Some(CreationStatus::Queued),
            "processing" => Some(CreationStatus::Processing),
            "done" => Some(CreationStatus::Done),
            "failed" => Some(CreationStatus::Failed),
            _ => None,
        }
    }

    /// States a retried client request may attach to.
    pub fn is_pending_like(&self) -> bool {
        matches!(
            self,
            CreationStatus::Pending | CreationStatus::Queued | CreationStatus::Processing
        )
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_finalized(&self) -> bool {
        matches!(self, CreationStatus::Done | CreationStatus::Failed)
    }
}

impl std::fmt::Display for CreationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored creation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreationRecord {
    /// Server-assigned creation id (UUID)
    pub id: String,
    /// Client-supplied idempotency hint, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_creation_id: Option<String>,
    /// Source file name, if the generation started from an upload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub status: CreationStatus,
    /// Credits charged for this creation
    pub cost: i64,
    /// Final output URL once done
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreationRecord {
    /// Create a new pending record.
    pub fn new_pending(id: impl Into<String>, cost: i64, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            client_creation_id: None,
            file_name: None,
            model: None,
            duration_secs: None,
            frame_rate: None,
            resolution: None,
            prompt: None,
            status: CreationStatus::Pending,
            cost,
            video_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the client creation id if Some, otherwise no-op.
    pub fn with_optional_client_id(mut self, client_creation_id: Option<String>) -> Self {
        if let Some(cid) = client_creation_id {
            self.client_creation_id = Some(cid);
        }
        self
    }

    /// Set the file name if Some, otherwise no-op.
    pub fn with_optional_file_name(mut self, file_name: Option<String>) -> Self {
        if let Some(name) = file_name {
            self.file_name = Some(name);
        }
        self
    }

    /// Set the generation parameters.
    pub fn with_params(
        mut self,
        model: impl Into<String>,
        duration_secs: u32,
        frame_rate: u32,
        resolution: impl Into<String>,
    ) -> Self {
        self.model = Some(model.into());
        self.duration_secs = Some(duration_secs);
        self.frame_rate = Some(frame_rate);
        self.resolution = Some(resolution.into());
        self
    }

    /// Set the prompt.
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }
}

/// Soft-matching key a retried request is compared against.
///
/// A record matches when every field present on both sides agrees;
/// a field absent on either side is a wildcard. Matching is best-effort
/// only: two distinct requests with identical parameters can collide.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupKey {
    pub client_creation_id: Option<String>,
    pub file_name: Option<String>,
    pub model: Option<String>,
    pub duration_secs: Option<u32>,
    pub frame_rate: Option<u32>,
    pub resolution: Option<String>,
}

impl DedupKey {
    /// Whether `record` agrees with this key on every mutually present field.
    pub fn matches(&self, record: &CreationRecord) -> bool {
        fn agree<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            match (a, b) {
                (Some(x), Some(y)) => x == y,
                _ => true,
            }
        }

        agree(&self.client_creation_id, &record.client_creation_id)
            && agree(&self.file_name, &record.file_name)
            && agree(&self.model, &record.model)
            && agree(&self.duration_secs, &record.duration_secs)
            && agree(&self.frame_rate, &record.frame_rate)
            && agree(&self.resolution, &record.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> CreationRecord {
        CreationRecord::new_pending("c1", 2, Utc::now())
            .with_params("kling", 5, 30, "720p")
            .with_optional_file_name(Some("clip.mp4".to_string()))
    }

    #[test]
    fn test_status_classification() {
        assert!(CreationStatus::Pending.is_pending_like());
        assert!(CreationStatus::Queued.is_pending_like());
        assert!(CreationStatus::Processing.is_pending_like());
        assert!(!CreationStatus::Done.is_pending_like());

        assert!(CreationStatus::Done.is_finalized());
        assert!(CreationStatus::Failed.is_finalized());
        assert!(!CreationStatus::Pending.is_finalized());
    }

    #[test]
    fn test_dedup_exact_match() {
        let key = DedupKey {
            model: Some("kling".to_string()),
            duration_secs: Some(5),
            frame_rate: Some(30),
            resolution: Some("720p".to_string()),
            file_name: Some("clip.mp4".to_string()),
            client_creation_id: None,
        };
        assert!(key.matches(&record()));
    }

    #[test]
    fn test_dedup_disagreement_rejects() {
        let key = DedupKey {
            model: Some("veo".to_string()),
            ..DedupKey::default()
        };
        assert!(!key.matches(&record()));
    }

    #[test]
    fn test_dedup_absent_fields_are_wildcards() {
        // Key carries nothing: matches anything.
        assert!(DedupKey::default().matches(&record()));

        // Record lacks client id, key has one: still a match (absent on
        // one side is a wildcard).
        let key = DedupKey {
            client_creation_id: Some("client-123".to_string()),
            ..DedupKey::default()
        };
        assert!(key.matches(&record()));
    }

    #[test]
    fn test_dedup_client_id_disagreement_rejects() {
        let mut rec = record();
        rec.client_creation_id = Some("other".to_string());
        let key = DedupKey {
            client_creation_id: Some("client-123".to_string()),
            ..DedupKey::default()
        };
        assert!(!key.matches(&rec));
    }
}
