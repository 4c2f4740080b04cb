/// Configuration management for variation-service
///
/// Loads configuration from environment variables with sensible defaults.
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

/// Default upload limit (500 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Artifacts older than this are swept (2 hours)
pub const DEFAULT_RETENTION_MAX_AGE_SECS: u64 = 2 * 60 * 60;

/// Sweep cadence (1 hour)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// FFmpeg timeout (60 minutes)
pub const DEFAULT_FFMPEG_TIMEOUT_SECS: u64 = 60 * 60;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub cors: CorsConfig,
    pub storage: StorageConfig,
    pub transcoder: TranscoderConfig,
    pub jobs: JobsConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub max_upload_bytes: u64,
    pub retention_max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl StorageConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("scratch")
    }

    /// Retention window as a signed duration; out-of-range values fall back
    /// to the default.
    pub fn retention_max_age(&self) -> chrono::Duration {
        i64::try_from(self.retention_max_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| {
                tracing::warn!(
                    value = self.retention_max_age_secs,
                    fallback = DEFAULT_RETENTION_MAX_AGE_SECS,
                    "retention max age out of range"
                );
                chrono::Duration::seconds(DEFAULT_RETENTION_MAX_AGE_SECS as i64)
            })
    }
}

/// Encoding settings shared by every run; never derived from a job
#[derive(Clone, Debug, Deserialize)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,
    pub preset: String,
    pub crf: u8,
    pub audio_bitrate: String,
    pub timeout_secs: u64,
    pub enable_mock: bool,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_bitrate: "128k".to_string(),
            timeout_secs: DEFAULT_FFMPEG_TIMEOUT_SECS,
            enable_mock: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct JobsConfig {
    pub default_variation_count: u32,
    pub max_variation_count: u32,
    pub rng_seed: Option<u64>,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_variation_count: 5,
            max_variation_count: 50,
            rng_seed: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let transcoder_defaults = TranscoderConfig::default();
        let job_defaults = JobsConfig::default();

        Ok(Config {
            app: AppConfig {
                host: std::env::var("VARIATION_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("VARIATION_SERVICE_PORT", 8085),
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .map(|raw| parse_origins(&raw))
                    .unwrap_or_else(|_| vec!["*".to_string()]),
            },
            storage: StorageConfig {
                root: std::env::var("VARIATION_STORAGE_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("./data")),
                max_upload_bytes: env_or("VARIATION_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                retention_max_age_secs: env_or(
                    "VARIATION_RETENTION_MAX_AGE_SECS",
                    DEFAULT_RETENTION_MAX_AGE_SECS,
                ),
                sweep_interval_secs: env_or(
                    "VARIATION_SWEEP_INTERVAL_SECS",
                    DEFAULT_SWEEP_INTERVAL_SECS,
                ),
            },
            transcoder: TranscoderConfig {
                ffmpeg_path: std::env::var("FFMPEG_PATH")
                    .unwrap_or(transcoder_defaults.ffmpeg_path),
                preset: std::env::var("VARIATION_TRANSCODE_PRESET")
                    .unwrap_or(transcoder_defaults.preset),
                crf: env_or("VARIATION_TRANSCODE_CRF", transcoder_defaults.crf),
                audio_bitrate: std::env::var("VARIATION_AUDIO_BITRATE")
                    .unwrap_or(transcoder_defaults.audio_bitrate),
                timeout_secs: env_or("FFMPEG_TIMEOUT_SECS", transcoder_defaults.timeout_secs),
                enable_mock: std::env::var("VARIATION_TRANSCODE_ENABLE_MOCK")
                    .map(|val| val == "1" || val.eq_ignore_ascii_case("true"))
                    .unwrap_or(transcoder_defaults.enable_mock),
            },
            jobs: JobsConfig {
                default_variation_count: env_or(
                    "VARIATION_DEFAULT_COUNT",
                    job_defaults.default_variation_count,
                ),
                max_variation_count: env_or(
                    "VARIATION_MAX_COUNT",
                    job_defaults.max_variation_count,
                ),
                rng_seed: std::env::var("VARIATION_RNG_SEED")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
        })
    }
}

/// Read and parse an environment variable, falling back to `default` when it
/// is unset or malformed.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, fallback = %default, "invalid config value");
            default
        }),
        Err(_) => default,
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    let origins: Vec<String> = raw
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    if origins.is_empty() {
        vec!["*".to_string()]
    } else {
        origins
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://a.dev, https://b.dev,,"),
            vec!["https://a.dev".to_string(), "https://b.dev".to_string()]
        );
        assert_eq!(parse_origins(" , "), vec!["*".to_string()]);
    }

    #[test]
    fn test_storage_layout() {
        let storage = StorageConfig {
            root: PathBuf::from("/srv/variations"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            retention_max_age_secs: DEFAULT_RETENTION_MAX_AGE_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        };
        assert_eq!(storage.uploads_dir(), PathBuf::from("/srv/variations/uploads"));
        assert_eq!(
            storage.processed_dir(),
            PathBuf::from("/srv/variations/processed")
        );
        assert_eq!(storage.retention_max_age(), chrono::Duration::hours(2));
    }

    #[test]
    fn test_oversized_retention_age_falls_back_to_default() {
        let default_age = chrono::Duration::seconds(DEFAULT_RETENTION_MAX_AGE_SECS as i64);
        for secs in [u64::MAX, i64::MAX as u64, 10_000_000_000_000_000] {
            let storage = StorageConfig {
                root: PathBuf::from("/srv/variations"),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                retention_max_age_secs: secs,
                sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            };
            assert_eq!(storage.retention_max_age(), default_age);
        }
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("VARIATION_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("VARIATION_TEST_ENV_OR_GARBAGE", 42u32), 42);
        std::env::set_var("VARIATION_TEST_ENV_OR_VALID", " 17 ");
        assert_eq!(env_or("VARIATION_TEST_ENV_OR_VALID", 42u32), 17);
    }
}
