//! Speech-to-text collaborators.
//!
//! `GeminiTranscriber` is the online path, `WhisperCliTranscriber` runs a local
//! whisper.cpp binary, and `FallbackTranscriber` chains the two: any error or
//! empty transcript from the primary hands the file to the fallback.

use super::error::AudioError;
use super::wav::normalize_to_16k_mono;
use crate::core::gemini::{GeminiClient, Part};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio: &Path) -> Result<String, AudioError>;
}

pub struct GeminiTranscriber {
    client: GeminiClient,
    language: String,
}

impl GeminiTranscriber {
    pub fn new(client: GeminiClient, language: impl Into<String>) -> Self {
        Self {
            client,
            language: language.into(),
        }
    }

    fn prompt(&self) -> String {
        format!(
            "Transcribe the speech in this audio verbatim. Language hint: {}. \
             Return only the transcript text, with no commentary. \
             If there is no speech, return an empty response.",
            self.language
        )
    }
}

impl Transcriber for GeminiTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String, AudioError> {
        info!("🎧 Transcribing {:?} with Gemini", audio);
        let parts = vec![Part::text(self.prompt()), Part::from_file("audio/wav", audio)?];
        let text = self.client.generate(&parts)?;
        Ok(text.trim().to_string())
    }
}

/// Offline transcription through the whisper.cpp command-line tool.
pub struct WhisperCliTranscriber {
    binary: PathBuf,
    model: PathBuf,
    language: String,
    threads: usize,
    scratch_dir: Option<PathBuf>,
}

impl WhisperCliTranscriber {
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            model: model.into(),
            language: language.into(),
            threads: num_cpus::get().min(4),
            scratch_dir: None,
        }
    }

    /// Where the 16 kHz copy goes; next to the input audio when unset.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn scratch_path(&self, audio: &Path) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => {
                let stem = audio.file_stem().map(|s| s.to_string_lossy().into_owned());
                dir.join(format!("{}.16k.wav", stem.unwrap_or_else(|| "audio".to_string())))
            }
            None => audio.with_extension("16k.wav"),
        }
    }

    fn command(&self, wav: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&self.model)
            .arg("-l")
            .arg(&self.language)
            .arg("-t")
            .arg(self.threads.to_string())
            .args(["-nt", "-np", "-f"])
            .arg(wav)
            .stdin(Stdio::null());
        cmd
    }
}

impl Transcriber for WhisperCliTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String, AudioError> {
        if !self.model.is_file() {
            return Err(AudioError::Transcription(format!(
                "whisper model not found at {:?}",
                self.model
            )));
        }

        // whisper.cpp only accepts 16 kHz mono
        let scratch = self.scratch_path(audio);
        if let Some(dir) = &self.scratch_dir {
            std::fs::create_dir_all(dir)?;
        }
        let wav = normalize_to_16k_mono(audio, &scratch)?;

        info!("🎙️ Running whisper.cpp on {:?}", wav);
        let output = self.command(&wav).output();
        if wav == scratch {
            let _ = std::fs::remove_file(&scratch);
        }

        let output = output.map_err(|e| {
            AudioError::Transcription(format!("failed to run {:?}: {}", self.binary, e))
        })?;
        if !output.status.success() {
            return Err(AudioError::Transcription(format!(
                "whisper exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        debug!("Whisper transcript: {}", text);
        Ok(text)
    }
}

pub struct FallbackTranscriber {
    primary: Box<dyn Transcriber>,
    fallback: Box<dyn Transcriber>,
}

impl FallbackTranscriber {
    pub fn new(primary: Box<dyn Transcriber>, fallback: Box<dyn Transcriber>) -> Self {
        Self { primary, fallback }
    }
}

impl Transcriber for FallbackTranscriber {
    fn transcribe(&self, audio: &Path) -> Result<String, AudioError> {
        match self.primary.transcribe(audio) {
            Ok(text) if !text.trim().is_empty() => return Ok(text),
            Ok(_) => warn!("⚠️ Primary transcriber returned nothing, trying fallback"),
            Err(e) => warn!("⚠️ Primary transcriber failed ({}), trying fallback", e),
        }
        self.fallback.transcribe(audio)
    }
}
