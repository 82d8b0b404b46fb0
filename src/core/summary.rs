//! Summary generation and persistence.

use crate::core::gemini::{GeminiClient, GeminiError, Part};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Substituted when the summarization collaborator fails.
pub const SUMMARY_ERROR_PLACEHOLDER: &str = "Error generating summary.";
/// Substituted when the model answers with no text.
pub const SUMMARY_EMPTY_PLACEHOLDER: &str = "No summary generated.";

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Gemini error: {0}")]
    Gemini(#[from] GeminiError),
    #[error("summarizer failed: {0}")]
    Failed(String),
    #[error("failed to write summary to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What to summarize: a transcript, or keyframe images when there is no transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryRequest {
    Transcript { text: String, context: String },
    Keyframes { paths: Vec<PathBuf>, context: String },
}

impl SummaryRequest {
    pub fn context(&self) -> &str {
        match self {
            SummaryRequest::Transcript { context, .. } | SummaryRequest::Keyframes { context, .. } => {
                context
            }
        }
    }
}

pub trait Summarizer: Send + Sync {
    fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError>;
}

pub struct GeminiSummarizer {
    client: GeminiClient,
}

impl GeminiSummarizer {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn build_parts(request: &SummaryRequest) -> Result<Vec<Part>, SummaryError> {
        match request {
            SummaryRequest::Transcript { text, context } => Ok(vec![Part::text(format!(
                "Summarize the following video transcription in clear, structured bullet points.\n\
                 Context: {}\n\nTranscription:\n{}",
                context, text
            ))]),
            SummaryRequest::Keyframes { paths, context } => {
                let mut parts = Vec::with_capacity(paths.len() + 1);
                parts.push(Part::text(format!(
                    "You are an advanced video analysis system. Analyze these keyframes from a video and provide:\n\
                     1. A comprehensive summary of the video content\n\
                     2. Key moments identified\n\
                     3. Main themes and subjects\n\
                     4. Any notable visual elements\n\
                     5. A timestamp-based breakdown of important sections\n\n\
                     Video context: {}",
                    context
                )));
                for path in paths {
                    parts.push(Part::from_file("image/jpeg", path)?);
                }
                Ok(parts)
            }
        }
    }
}

impl Summarizer for GeminiSummarizer {
    fn summarize(&self, request: &SummaryRequest) -> Result<String, SummaryError> {
        let parts = Self::build_parts(request)?;
        info!("📝 Requesting summary ({} parts)", parts.len());
        let text = self.client.generate(&parts)?;
        Ok(text)
    }
}

/// Runs the summarizer and never fails: errors become the error placeholder,
/// blank answers the empty placeholder.
pub fn summarize_or_placeholder(summarizer: &dyn Summarizer, request: &SummaryRequest) -> String {
    match summarizer.summarize(request) {
        Ok(text) if text.trim().is_empty() => {
            warn!("⚠️ Summarizer returned no text");
            SUMMARY_EMPTY_PLACEHOLDER.to_string()
        }
        Ok(text) => text,
        Err(e) => {
            warn!("⚠️ Summary generation failed: {}", e);
            SUMMARY_ERROR_PLACEHOLDER.to_string()
        }
    }
}

/// Writes `{video_name}_summary.txt` under its directory.
#[derive(Debug, Clone)]
pub struct SummaryStore {
    directory: PathBuf,
}

impl SummaryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, video_name: &str) -> PathBuf {
        self.directory.join(format!("{}_summary.txt", video_name))
    }

    pub fn save(&self, summary: &str, video_name: &str) -> Result<PathBuf, SummaryError> {
        let path = self.path_for(video_name);
        let write = |dir: &Path| -> std::io::Result<()> {
            fs::create_dir_all(dir)?;
            fs::write(&path, summary)
        };
        write(&self.directory).map_err(|source| SummaryError::Persistence {
            path: path.clone(),
            source,
        })?;
        info!("💾 Summary saved to {:?}", path);
        Ok(path)
    }
}
