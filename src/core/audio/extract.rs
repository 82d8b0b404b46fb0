//! Audio track extraction through an ffmpeg subprocess.

use super::error::AudioError;
use log::{error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub trait AudioExtractor: Send + Sync {
    /// Writes the video's audio track to `output` as mono PCM WAV and returns the path.
    fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf, AudioError>;
}

pub struct FfmpegAudioExtractor {
    ffmpeg: PathBuf,
    sample_rate: u32,
}

impl FfmpegAudioExtractor {
    pub fn new(ffmpeg: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            sample_rate,
        }
    }

    fn command(&self, video: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-v", "error", "-nostdin", "-y", "-i"])
            .arg(video)
            .args(["-vn", "-acodec", "pcm_s16le"])
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .args(["-ac", "1"])
            .arg(output)
            .stdin(Stdio::null());
        cmd
    }
}

impl AudioExtractor for FfmpegAudioExtractor {
    fn extract_audio(&self, video: &Path, output: &Path) -> Result<PathBuf, AudioError> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }

        info!("🎵 Extracting audio from {:?} at {} Hz", video, self.sample_rate);
        let result = self.command(video, output).output().map_err(|e| {
            AudioError::Transcoder(format!("failed to run {:?}: {}", self.ffmpeg, e))
        })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            error!("❌ ffmpeg audio extraction failed: {}", stderr.trim());
            return Err(AudioError::Transcoder(format!(
                "ffmpeg exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        info!("✅ Audio extracted successfully: {:?}", output);
        Ok(output.to_path_buf())
    }
}
