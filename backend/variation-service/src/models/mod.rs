/// Data models for variation-service
///
/// This module defines structures for:
/// - Artifact: uploaded and derived media blobs
/// - VariationConfig: the randomized transform parameters for one variation
/// - VariationResult / Job: progress and results of a processing request
///
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ========================================
// Artifact Models
// ========================================

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactOrigin {
    Uploaded,
    Derived,
}

impl ArtifactOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Derived => "derived",
        }
    }
}

/// Immutable media blob tracked by the artifact store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub origin: ArtifactOrigin,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub location: String,
}

/// Upload response DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub artifact_id: Uuid,
    pub size_bytes: u64,
}

impl From<Artifact> for UploadResponse {
    fn from(artifact: Artifact) -> Self {
        Self {
            artifact_id: artifact.id,
            size_bytes: artifact.size_bytes,
        }
    }
}

// ========================================
// Variation Models
// ========================================

/// Named parameter family a variation config was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFamily {
    /// Broad color/speed/volume tweaks with an occasional mirror
    Balanced,
    /// Narrow color bands plus gamma and optional grain
    Subtle,
    /// Geometric reframing: scale, crop and frequent mirror
    Reframe,
}

impl ConfigFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Subtle => "subtle",
            Self::Reframe => "reframe",
        }
    }
}

/// Randomized transform parameters for one variation.
///
/// A `None` parameter means the corresponding stage is skipped; it is never
/// interpreted as the identity value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<ConfigFamily>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Percentage trimmed from each dimension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_margin: Option<f64>,
    pub horizontal_flip: bool,
    /// Present iff noise injection is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub noise_strength: Option<f64>,
}

impl VariationConfig {
    pub fn has_noise(&self) -> bool {
        self.noise_strength.is_some()
    }
}

/// Output record for one successfully produced variation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariationResult {
    /// Identifier of the produced artifact; also used for download
    pub id: Uuid,
    pub index: u32,
    pub similarity: u8,
    pub size_bytes: u64,
    pub effects: Vec<String>,
    pub config: VariationConfig,
    pub download_url: String,
    pub completed_at: DateTime<Utc>,
}

// ========================================
// Job Models
// ========================================

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Processing request for N variations of one source video
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub status: JobStatus,
    pub progress: u8,
    pub results: Vec<VariationResult>,
    pub video_id: Uuid,
    pub variation_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: u64, video_id: Uuid, variation_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Active,
            progress: 0,
            results: Vec::with_capacity(variation_count as usize),
            video_id,
            variation_count,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Create job request DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub video_id: Uuid,
    pub variation_count: Option<i64>,
}

/// Create job response DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: u64,
}

/// Status body returned for job ids that were never created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobNotFoundResponse {
    pub status: String,
}

impl JobNotFoundResponse {
    pub fn new() -> Self {
        Self {
            status: "not_found".to_string(),
        }
    }
}

impl Default for JobNotFoundResponse {
    fn default() -> Self {
        Self::new()
    }
}
