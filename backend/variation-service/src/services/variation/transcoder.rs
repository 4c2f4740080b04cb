//! Processing backends that execute a `TransformPlan`
//!
//! - `FfmpegTranscoder`: spawns the `ffmpeg` binary with a filter chain built from the plan
//! - `PassthroughTranscoder`: copies the input unchanged (mock mode, no ffmpeg required)
//!
//! Encoding settings come from `TranscoderConfig` and are identical for every run.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use super::pipeline::{TransformPlan, TransformStage};
use crate::config::TranscoderConfig;
use crate::error::PipelineError;

/// Maximum stderr bytes kept in a failure message
const STDERR_TAIL_BYTES: usize = 2000;

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Render `input` into a new file at `output` applying every stage of `plan`
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        plan: &TransformPlan,
    ) -> Result<(), PipelineError>;

    fn name(&self) -> &'static str;
}

/// Filter chains for one plan, in stage order
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilterChains {
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl FilterChains {
    pub fn from_plan(plan: &TransformPlan) -> Self {
        let mut chains = Self::default();

        for stage in plan.stages() {
            match stage {
                TransformStage::Tempo { speed } => {
                    chains.video.push(format!("setpts={:.6}*PTS", 1.0 / speed));
                    chains.audio.push(format!("atempo={speed:.6}"));
                }
                TransformStage::ColorCorrection {
                    brightness,
                    contrast,
                    saturation,
                    gamma,
                } => {
                    let params: Vec<String> = [
                        ("brightness", brightness),
                        ("contrast", contrast),
                        ("saturation", saturation),
                        ("gamma", gamma),
                    ]
                    .iter()
                    .filter_map(|(key, value)| value.map(|v| format!("{key}={v:.4}")))
                    .collect();
                    chains.video.push(format!("eq={}", params.join(":")));
                }
                TransformStage::Scale { factor } => {
                    chains.video.push(format!(
                        "scale=trunc(iw*{factor:.4}/2)*2:trunc(ih*{factor:.4}/2)*2"
                    ));
                }
                TransformStage::Crop { margin_percent } => {
                    let keep = (100.0 - margin_percent) / 100.0;
                    chains.video.push(format!(
                        "crop=trunc(iw*{keep:.4}/2)*2:trunc(ih*{keep:.4}/2)*2"
                    ));
                }
                TransformStage::HorizontalFlip => chains.video.push("hflip".to_string()),
                TransformStage::Noise { strength } => {
                    chains.video.push(format!("noise=alls={strength:.2}:allf=u"));
                }
                TransformStage::Gain { volume } => {
                    chains.audio.push(format!("volume={volume:.4}"));
                }
            }
        }

        chains
    }
}

/// Runs the external `ffmpeg` binary
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    pub fn new(config: TranscoderConfig) -> Self {
        info!(
            ffmpeg = %config.ffmpeg_path,
            preset = %config.preset,
            crf = config.crf,
            "Initializing FFmpeg transcoder"
        );
        Self { config }
    }

    /// Full argument list for one run
    pub fn build_args(&self, input: &Path, output: &Path, plan: &TransformPlan) -> Vec<String> {
        let chains = FilterChains::from_plan(plan);
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-y".into(),
            "-i".into(),
            input.display().to_string(),
        ];

        if !chains.video.is_empty() {
            args.push("-vf".into());
            args.push(chains.video.join(","));
        }
        if !chains.audio.is_empty() {
            args.push("-af".into());
            args.push(chains.audio.join(","));
        }

        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.config.preset.clone(),
            "-crf".to_string(),
            self.config.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            self.config.audio_bitrate.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            output.display().to_string(),
        ]);

        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        plan: &TransformPlan,
    ) -> Result<(), PipelineError> {
        let args = self.build_args(input, output, plan);
        debug!(command = %args.join(" "), "Running ffmpeg");

        let child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        let result = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| PipelineError::Timeout(self.config.timeout_secs))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipelineError::ProcessFailed {
                status: result.status.to_string(),
                stderr: tail(stderr.trim(), STDERR_TAIL_BYTES).to_string(),
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "ffmpeg"
    }
}

/// Copies the source through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTranscoder;

#[async_trait]
impl Transcoder for PassthroughTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        plan: &TransformPlan,
    ) -> Result<(), PipelineError> {
        debug!(stages = ?plan.effects(), "Passthrough transcode");
        tokio::fs::copy(input, output).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VariationConfig;
    use std::path::PathBuf;

    fn plan(config: VariationConfig) -> TransformPlan {
        TransformPlan::from_config(&config).unwrap()
    }

    #[test]
    fn test_tempo_rescales_video_and_audio_together() {
        let chains = FilterChains::from_plan(&plan(VariationConfig {
            speed: Some(1.25),
            ..VariationConfig::default()
        }));
        assert_eq!(chains.video, vec!["setpts=0.800000*PTS"]);
        assert_eq!(chains.audio, vec!["atempo=1.250000"]);
    }

    #[test]
    fn test_color_parameters_share_one_filter() {
        let chains = FilterChains::from_plan(&plan(VariationConfig {
            brightness: Some(-0.02),
            gamma: Some(1.03),
            ..VariationConfig::default()
        }));
        assert_eq!(chains.video, vec!["eq=brightness=-0.0200:gamma=1.0300"]);
        assert!(chains.audio.is_empty());
    }

    #[test]
    fn test_tempo_and_gain_both_in_audio_chain() {
        let chains = FilterChains::from_plan(&plan(VariationConfig {
            speed: Some(0.96),
            volume: Some(1.1),
            horizontal_flip: true,
            ..VariationConfig::default()
        }));
        assert_eq!(chains.audio, vec!["atempo=0.960000", "volume=1.1000"]);
        assert_eq!(chains.video.last().map(String::as_str), Some("hflip"));
    }

    #[test]
    fn test_noise_is_last_visual_filter() {
        let chains = FilterChains::from_plan(&plan(VariationConfig {
            scale: Some(1.02),
            crop_margin: Some(2.0),
            horizontal_flip: true,
            noise_strength: Some(1.5),
            ..VariationConfig::default()
        }));
        assert_eq!(
            chains.video,
            vec![
                "scale=trunc(iw*1.0200/2)*2:trunc(ih*1.0200/2)*2",
                "crop=trunc(iw*0.9800/2)*2:trunc(ih*0.9800/2)*2",
                "hflip",
                "noise=alls=1.50:allf=u",
            ]
        );
    }

    #[test]
    fn test_args_omit_filters_for_empty_plan() {
        let transcoder = FfmpegTranscoder::new(TranscoderConfig::default());
        let args = transcoder.build_args(
            &PathBuf::from("/tmp/in.mp4"),
            &PathBuf::from("/tmp/out.mp4"),
            &TransformPlan::default(),
        );

        assert!(!args.iter().any(|a| a == "-vf" || a == "-af"));
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
        let preset = args.iter().position(|a| a == "-preset").unwrap();
        assert_eq!(args[preset + 1], "medium");
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "23");
    }

    #[tokio::test]
    async fn test_missing_binary_reports_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(TranscoderConfig {
            ffmpeg_path: "/nonexistent/ffmpeg-binary".to_string(),
            ..TranscoderConfig::default()
        });
        let result = transcoder
            .transcode(
                &dir.path().join("in.mp4"),
                &dir.path().join("out.mp4"),
                &TransformPlan::default(),
            )
            .await;
        assert!(matches!(result, Err(PipelineError::Spawn(_))));
    }

    #[test]
    fn test_tail_respects_char_boundaries() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("héllo", 4), "llo");
    }
}
