//! Runtime configuration.
//!
//! Built once at startup (`Config::from_env`) and passed into every component.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Gemini API key
    pub gemini_api_key: Option<String>,
    /// Primary Gemini model
    pub gemini_model: String,
    /// Models tried after the primary fails
    pub gemini_fallback_models: Vec<String>,

    /// Seconds between sampled frames
    pub frame_extraction_rate: f64,
    /// Keep a frame when its SSIM against the last keyframe is below this
    pub keyframe_threshold: f64,
    /// Longer side limit for sampled frames, 0 disables
    pub max_frame_dimension: u32,

    pub audio_extraction_enabled: bool,
    pub audio_sample_rate: u32,
    pub audio_language: String,

    pub keyframes_dir: PathBuf,
    pub summaries_dir: PathBuf,
    pub audio_dir: PathBuf,
    pub temp_dir: PathBuf,

    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// whisper.cpp binary for offline transcription
    pub whisper_cli_path: PathBuf,
    pub whisper_model_path: Option<PathBuf>,

    pub cloud_bucket_name: Option<String>,
    pub cloud_project_id: Option<String>,
    pub gcs_access_token: Option<String>,

    /// Parallel videos in batch mode
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_output_dir("outputs")
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    match var(key).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            value: other.to_string(),
        }),
    }
}

impl Config {
    /// Defaults with every artifact directory under `output_dir`.
    pub fn with_output_dir(output_dir: impl AsRef<Path>) -> Self {
        let out = output_dir.as_ref();
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            gemini_fallback_models: vec!["gemini-2.5-flash-lite".to_string()],
            frame_extraction_rate: 1.0,
            keyframe_threshold: 0.5,
            max_frame_dimension: 1024,
            audio_extraction_enabled: true,
            audio_sample_rate: 16_000,
            audio_language: "en".to_string(),
            keyframes_dir: out.join("keyframes"),
            summaries_dir: out.join("summaries"),
            audio_dir: out.join("audio"),
            temp_dir: out.join("temp"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            whisper_cli_path: PathBuf::from("whisper-cli"),
            whisper_model_path: None,
            cloud_bucket_name: None,
            cloud_project_id: None,
            gcs_access_token: None,
            workers: num_cpus::get(),
        }
    }

    /// Loads `.env` (if present) and then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_current_env()
    }

    pub fn from_current_env() -> Result<Self, ConfigError> {
        let output_dir = var("OUTPUT_DIR").unwrap_or_else(|| "outputs".to_string());
        let defaults = Self::with_output_dir(&output_dir);

        let config = Self {
            gemini_api_key: var("GEMINI_API_KEY"),
            gemini_model: var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            gemini_fallback_models: var("GEMINI_FALLBACK_MODELS")
                .map(|s| {
                    s.split(',')
                        .map(|m| m.trim().to_string())
                        .filter(|m| !m.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.gemini_fallback_models),
            frame_extraction_rate: parse_var("FRAME_EXTRACTION_RATE", defaults.frame_extraction_rate)?,
            keyframe_threshold: parse_var("KEYFRAME_THRESHOLD", defaults.keyframe_threshold)?,
            max_frame_dimension: parse_var("MAX_FRAME_DIMENSION", defaults.max_frame_dimension)?,
            audio_extraction_enabled: parse_flag("AUDIO_EXTRACTION_ENABLED", true)?,
            audio_sample_rate: parse_var("AUDIO_SAMPLE_RATE", defaults.audio_sample_rate)?,
            audio_language: var("AUDIO_LANGUAGE").unwrap_or(defaults.audio_language),
            keyframes_dir: defaults.keyframes_dir,
            summaries_dir: defaults.summaries_dir,
            audio_dir: defaults.audio_dir,
            temp_dir: defaults.temp_dir,
            ffmpeg_path: var("FFMPEG_PATH").map(PathBuf::from).unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: var("FFPROBE_PATH").map(PathBuf::from).unwrap_or(defaults.ffprobe_path),
            whisper_cli_path: var("WHISPER_CLI_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.whisper_cli_path),
            whisper_model_path: var("WHISPER_MODEL_PATH").map(PathBuf::from),
            cloud_bucket_name: var("CLOUD_BUCKET_NAME"),
            cloud_project_id: var("CLOUD_PROJECT_ID"),
            gcs_access_token: var("GCS_ACCESS_TOKEN"),
            workers: parse_var("WORKERS", defaults.workers)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frame_extraction_rate.is_finite() && self.frame_extraction_rate > 0.0) {
            return Err(ConfigError::Invalid {
                key: "FRAME_EXTRACTION_RATE",
                value: self.frame_extraction_rate.to_string(),
            });
        }
        if !self.keyframe_threshold.is_finite() {
            return Err(ConfigError::Invalid {
                key: "KEYFRAME_THRESHOLD",
                value: self.keyframe_threshold.to_string(),
            });
        }
        if self.audio_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                key: "AUDIO_SAMPLE_RATE",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Primary model first, then the fallbacks, without duplicates.
    pub fn gemini_models(&self) -> Vec<String> {
        let mut models = vec![self.gemini_model.clone()];
        for m in &self.gemini_fallback_models {
            if !models.contains(m) {
                models.push(m.clone());
            }
        }
        models
    }

    pub fn ensure_directories(&self) -> io::Result<()> {
        for dir in [
            &self.keyframes_dir,
            &self.summaries_dir,
            &self.audio_dir,
            &self.temp_dir,
        ] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
