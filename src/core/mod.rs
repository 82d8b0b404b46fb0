pub mod audio;
pub mod config;
pub mod gemini;
pub mod pipeline;
pub mod summary;
pub mod upload;
pub mod video;

pub use config::{Config, ConfigError};
pub use pipeline::{PipelineError, PipelineResult, VideoPipeline};
