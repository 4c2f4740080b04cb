//! Composition of a `VariationConfig` into ordered transform stages, and
//! application of those stages to a stored artifact.
//!
//! Stage order and skip thresholds:
//! 1. tempo        `|speed - 1| > 0.01`
//! 2. color        any of brightness/contrast/saturation/gamma present (one combined operator)
//! 3. scale        `|scale - 1| > 0.005`
//! 4. crop         `crop_margin > 0.5` percent, after scale
//! 5. hflip        flag set
//! 6. noise        flag set, last visual stage
//! 7. gain         `|volume - 1| > 0.05`, independent of tempo

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::transcoder::Transcoder;
use crate::error::PipelineError;
use crate::models::{Artifact, ArtifactOrigin, VariationConfig};
use crate::services::storage::ArtifactStore;

pub const SPEED_SKIP_THRESHOLD: f64 = 0.01;
pub const SCALE_SKIP_THRESHOLD: f64 = 0.005;
pub const CROP_SKIP_THRESHOLD: f64 = 0.5;
pub const VOLUME_SKIP_THRESHOLD: f64 = 0.05;

/// One transform operator with its resolved parameters
#[derive(Debug, Clone, PartialEq)]
pub enum TransformStage {
    /// Playback-rate change; video timestamps scale by `1/speed`, audio tempo by `speed`
    Tempo { speed: f64 },
    ColorCorrection {
        brightness: Option<f64>,
        contrast: Option<f64>,
        saturation: Option<f64>,
        gamma: Option<f64>,
    },
    Scale { factor: f64 },
    /// Keeps `(100 - margin_percent) / 100` of each dimension
    Crop { margin_percent: f64 },
    HorizontalFlip,
    Noise { strength: f64 },
    Gain { volume: f64 },
}

impl TransformStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Tempo { .. } => "speed",
            Self::ColorCorrection { .. } => "color",
            Self::Scale { .. } => "scale",
            Self::Crop { .. } => "crop",
            Self::HorizontalFlip => "flip",
            Self::Noise { .. } => "noise",
            Self::Gain { .. } => "volume",
        }
    }
}

/// Ordered stages derived from one config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformPlan {
    stages: Vec<TransformStage>,
}

impl TransformPlan {
    pub fn from_config(config: &VariationConfig) -> Result<Self, PipelineError> {
        let mut stages = Vec::new();

        if let Some(speed) = config.speed {
            let speed = require_in("speed", "speed", speed, 0.5, 2.0)?;
            if (speed - 1.0).abs() > SPEED_SKIP_THRESHOLD {
                stages.push(TransformStage::Tempo { speed });
            }
        }

        let color_present = config.brightness.is_some()
            || config.contrast.is_some()
            || config.saturation.is_some()
            || config.gamma.is_some();
        if color_present {
            stages.push(TransformStage::ColorCorrection {
                brightness: config
                    .brightness
                    .map(|v| require_in("color", "brightness", v, -1.0, 1.0))
                    .transpose()?,
                contrast: config
                    .contrast
                    .map(|v| require_in("color", "contrast", v, 0.0, 10.0))
                    .transpose()?,
                saturation: config
                    .saturation
                    .map(|v| require_in("color", "saturation", v, 0.0, 3.0))
                    .transpose()?,
                gamma: config
                    .gamma
                    .map(|v| require_in("color", "gamma", v, 0.1, 10.0))
                    .transpose()?,
            });
        }

        if let Some(factor) = config.scale {
            let factor = require_in("scale", "scale", factor, 0.1, 4.0)?;
            if (factor - 1.0).abs() > SCALE_SKIP_THRESHOLD {
                stages.push(TransformStage::Scale { factor });
            }
        }

        if let Some(margin) = config.crop_margin {
            if !margin.is_finite() || !(0.0..50.0).contains(&margin) {
                return Err(invalid("crop", format!("margin {margin} outside [0, 50)")));
            }
            if margin > CROP_SKIP_THRESHOLD {
                stages.push(TransformStage::Crop {
                    margin_percent: margin,
                });
            }
        }

        if config.horizontal_flip {
            stages.push(TransformStage::HorizontalFlip);
        }

        if let Some(strength) = config.noise_strength {
            let strength = require_in("noise", "strength", strength, 0.0, 100.0)?;
            stages.push(TransformStage::Noise { strength });
        }

        if let Some(volume) = config.volume {
            let volume = require_in("volume", "volume", volume, 0.0, 10.0)?;
            if (volume - 1.0).abs() > VOLUME_SKIP_THRESHOLD {
                stages.push(TransformStage::Gain { volume });
            }
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[TransformStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Names of the stages that will actually run
    pub fn effects(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}

fn invalid(stage: &'static str, reason: String) -> PipelineError {
    PipelineError::InvalidStage { stage, reason }
}

fn require_in(
    stage: &'static str,
    param: &str,
    value: f64,
    min: f64,
    max: f64,
) -> Result<f64, PipelineError> {
    if value.is_finite() && value >= min && value <= max {
        Ok(value)
    } else {
        Err(invalid(
            stage,
            format!("{param} {value} outside [{min}, {max}]"),
        ))
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub artifact: Artifact,
    pub effects: Vec<String>,
}

/// Applies transform plans to stored artifacts through a `Transcoder`
#[derive(Clone)]
pub struct TransformPipeline {
    store: Arc<dyn ArtifactStore>,
    transcoder: Arc<dyn Transcoder>,
    scratch_root: PathBuf,
}

impl TransformPipeline {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        transcoder: Arc<dyn Transcoder>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            transcoder,
            scratch_root: scratch_root.into(),
        }
    }

    /// Produce a new derived artifact from `source_id`. The source is never modified.
    pub async fn apply(
        &self,
        source_id: Uuid,
        config: &VariationConfig,
    ) -> Result<PipelineOutput, PipelineError> {
        let plan = TransformPlan::from_config(config)?;
        if self.store.metadata(source_id).is_none() {
            return Err(PipelineError::SourceUnavailable(source_id));
        }

        let workdir = self
            .scratch_root
            .join(format!("variation_{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir).await?;

        let result = self.run_in(&workdir, source_id, &plan).await;

        if let Err(e) = tokio::fs::remove_dir_all(&workdir).await {
            warn!(path = %workdir.display(), error = %e, "Failed to clean scratch directory");
        }

        let artifact = result?;
        debug!(
            source_id = %source_id,
            artifact_id = %artifact.id,
            transcoder = self.transcoder.name(),
            stages = plan.stages().len(),
            "Variation artifact produced"
        );

        Ok(PipelineOutput {
            artifact,
            effects: plan.effects(),
        })
    }

    async fn run_in(
        &self,
        workdir: &Path,
        source_id: Uuid,
        plan: &TransformPlan,
    ) -> Result<Artifact, PipelineError> {
        let input_path = workdir.join("input.mp4");
        let output_path = workdir.join("output.mp4");

        self.store.copy_to(source_id, &input_path).await?;
        self.transcoder
            .transcode(&input_path, &output_path, plan)
            .await?;

        if tokio::fs::metadata(&output_path).await?.len() == 0 {
            return Err(PipelineError::EmptyOutput);
        }

        Ok(self
            .store
            .put_file(&output_path, ArtifactOrigin::Derived)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::{FsArtifactStore, MemoryArtifactStore};
    use bytes::Bytes;
    use crate::services::variation::transcoder::PassthroughTranscoder;

    #[test]
    fn test_empty_config_produces_empty_plan() {
        let plan = TransformPlan::from_config(&VariationConfig::default()).unwrap();
        assert!(plan.is_empty());
        assert!(plan.effects().is_empty());
    }

    #[test]
    fn test_near_identity_values_are_skipped() {
        let config = VariationConfig {
            speed: Some(1.009),
            scale: Some(1.004),
            crop_margin: Some(0.5),
            volume: Some(0.96),
            ..VariationConfig::default()
        };
        let plan = TransformPlan::from_config(&config).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_full_config_orders_stages() {
        let config = VariationConfig {
            speed: Some(1.04),
            brightness: Some(0.02),
            saturation: Some(1.08),
            scale: Some(1.015),
            crop_margin: Some(1.5),
            horizontal_flip: true,
            noise_strength: Some(2.0),
            volume: Some(1.09),
            ..VariationConfig::default()
        };
        let plan = TransformPlan::from_config(&config).unwrap();
        assert_eq!(
            plan.effects(),
            vec!["speed", "color", "scale", "crop", "flip", "noise", "volume"]
        );
        assert_eq!(
            plan.stages()[1],
            TransformStage::ColorCorrection {
                brightness: Some(0.02),
                contrast: None,
                saturation: Some(1.08),
                gamma: None,
            }
        );
    }

    #[test]
    fn test_color_stage_present_even_at_identity() {
        let config = VariationConfig {
            contrast: Some(1.0),
            ..VariationConfig::default()
        };
        let plan = TransformPlan::from_config(&config).unwrap();
        assert_eq!(plan.effects(), vec!["color"]);
    }

    #[test]
    fn test_invalid_parameters_fail_stage_construction() {
        let nan_speed = VariationConfig {
            speed: Some(f64::NAN),
            ..VariationConfig::default()
        };
        assert!(matches!(
            TransformPlan::from_config(&nan_speed),
            Err(PipelineError::InvalidStage { stage: "speed", .. })
        ));

        let huge_crop = VariationConfig {
            crop_margin: Some(75.0),
            ..VariationConfig::default()
        };
        assert!(matches!(
            TransformPlan::from_config(&huge_crop),
            Err(PipelineError::InvalidStage { stage: "crop", .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_writes_new_artifact_and_keeps_source() {
        let scratch = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        let source = store
            .put(Bytes::from_static(b"source-bytes"), ArtifactOrigin::Uploaded)
            .await
            .unwrap();

        let pipeline = TransformPipeline::new(
            store.clone(),
            Arc::new(PassthroughTranscoder),
            scratch.path(),
        );
        let output = pipeline
            .apply(source.id, &VariationConfig::default())
            .await
            .unwrap();

        assert!(output.effects.is_empty());
        assert_ne!(output.artifact.id, source.id);
        assert_eq!(output.artifact.origin, ArtifactOrigin::Derived);
        assert_eq!(
            store.get(source.id).await.unwrap(),
            Bytes::from_static(b"source-bytes")
        );
        assert_eq!(store.len(), 2);
        assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_apply_streams_through_fs_store() {
        let root = tempfile::tempdir().unwrap();
        let store = Arc::new(
            FsArtifactStore::new(root.path().join("uploads"), root.path().join("processed"))
                .await
                .unwrap(),
        );
        let source = store
            .put(Bytes::from_static(b"on-disk-source"), ArtifactOrigin::Uploaded)
            .await
            .unwrap();

        let pipeline = TransformPipeline::new(
            store.clone(),
            Arc::new(PassthroughTranscoder),
            root.path().join("scratch"),
        );
        let output = pipeline
            .apply(source.id, &VariationConfig::default())
            .await
            .unwrap();

        assert_eq!(output.artifact.size_bytes, 14);
        assert!(output.artifact.location.contains("processed"));
        assert_eq!(
            std::fs::read(&output.artifact.location).unwrap(),
            b"on-disk-source"
        );
        assert_eq!(
            std::fs::read_dir(root.path().join("scratch")).unwrap().count(),
            0
        );
    }

    #[tokio::test]
    async fn test_apply_unknown_source_fails() {
        let scratch = tempfile::tempdir().unwrap();
        let pipeline = TransformPipeline::new(
            Arc::new(MemoryArtifactStore::new()),
            Arc::new(PassthroughTranscoder),
            scratch.path(),
        );
        let result = pipeline.apply(Uuid::new_v4(), &VariationConfig::default()).await;
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }
}
