pub mod error;
pub mod frame;
pub mod sampler;
pub mod selector;
pub mod similarity;
pub mod source;
pub mod store;

pub use error::VideoError;
pub use frame::{Frame, GrayFrame};
pub use sampler::{compute_stride, CancelFlag, FrameSampler};
pub use selector::{KeyframeSelector, SelectionStats};
pub use similarity::{ssim, SimilarityScorer};
pub use source::{
    probe_video, validate_video_file, FfmpegBackend, FfmpegSource, VideoBackend, VideoMetadata,
    VideoSource,
};
pub use store::KeyframeStore;
