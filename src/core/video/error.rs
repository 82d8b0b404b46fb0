use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("video source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
    #[error("frame dimensions differ: {left:?} vs {right:?}")]
    DimensionMismatch { left: (u32, u32), right: (u32, u32) },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("failed to persist keyframe {index} to {path}: {source}")]
    Persistence {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("processing cancelled")]
    Cancelled,
}

impl VideoError {
    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        VideoError::SourceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
