use crate::core::gemini::GeminiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WAV format error: {0}")]
    Wav(#[from] hound::Error),
    #[error("Resample error: {0}")]
    Resample(String),
    #[error("Transcoder error: {0}")]
    Transcoder(String),
    #[error("Transcription failed: {0}")]
    Transcription(String),
    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),
}
