pub mod error;
pub mod extract;
pub mod transcribe;
pub mod wav;

pub use error::AudioError;
pub use extract::{AudioExtractor, FfmpegAudioExtractor};
pub use transcribe::{FallbackTranscriber, GeminiTranscriber, Transcriber, WhisperCliTranscriber};
pub use wav::{load_wav_mono_f32, normalize_to_16k_mono, resample_to_16k_mono};
