//! Generation request parameters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::creation::DedupKey;
use crate::plan::ResolutionTier;

/// Default model when the client does not pick one.
pub const DEFAULT_MODEL: &str = "kling";
/// Default clip duration in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 5;
/// Default frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Wire shape of a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<u32>,
    #[serde(default)]
    pub resolution: Option<String>,
    /// Source file name when generating from an uploaded image/clip.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Client-generated id used for retry deduplication.
    #[serde(default)]
    pub client_creation_id: Option<String>,
}

/// Normalized parameters a request resolves to before any billing math.
///
/// Normalization is deterministic so a retried request resolves to the
/// same parameters, cost, and dedup key as the original.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub model: String,
    pub duration_secs: u32,
    pub frame_rate: u32,
    pub resolution: ResolutionTier,
    pub file_name: Option<String>,
    pub client_creation_id: Option<String>,
}

impl GenerationParams {
    /// Apply defaults and normalize enum-like strings.
    pub fn from_request(req: GenerationRequest) -> Self {
        let model = req
            .model
            .map(|m| m.trim().to_lowercase())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let resolution = req
            .resolution
            .as_deref()
            .map(ResolutionTier::from_str)
            .unwrap_or_default();

        Self {
            prompt: req.prompt.trim().to_string(),
            model,
            duration_secs: req.duration_secs.unwrap_or(DEFAULT_DURATION_SECS),
            frame_rate: req.frame_rate.unwrap_or(DEFAULT_FRAME_RATE),
            resolution,
            file_name: req.file_name.filter(|f| !f.is_empty()),
            client_creation_id: req.client_creation_id.filter(|c| !c.is_empty()),
        }
    }

    /// The soft-matching key this request carries for retry dedup.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            client_creation_id: self.client_creation_id.clone(),
            file_name: self.file_name.clone(),
            model: Some(self.model.clone()),
            duration_secs: Some(self.duration_secs),
            frame_rate: Some(self.frame_rate),
            resolution: Some(self.resolution.as_str().to_string()),
        }
    }
}
