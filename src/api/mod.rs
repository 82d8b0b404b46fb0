pub mod video;

pub use video::{SetupError, VideoSummarizer};
