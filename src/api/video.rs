//! 视频摘要器：按配置组装流水线的各个协作方

use crate::core::audio::{FallbackTranscriber, FfmpegAudioExtractor, GeminiTranscriber, Transcriber, WhisperCliTranscriber};
use crate::core::config::Config;
use crate::core::gemini::GeminiClient;
use crate::core::pipeline::{Collaborators, PipelineError, PipelineResult, VideoPipeline};
use crate::core::summary::GeminiSummarizer;
use crate::core::upload::{GcsUploader, UploadError};
use crate::core::video::{probe_video, CancelFlag, FfmpegBackend, VideoError, VideoMetadata};
use log::{info, warn};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to create output directories: {0}")]
    Io(#[from] std::io::Error),
    #[error("cloud upload unavailable: {0}")]
    Upload(#[from] UploadError),
}

/// 视频摘要器 - 抽帧 + 关键帧 + 转写 + 摘要
pub struct VideoSummarizer {
    pipeline: VideoPipeline,
    cancel: CancelFlag,
}

impl VideoSummarizer {
    /// 创建摘要器；`cloud` 为 true 时必须配置好存储桶和令牌
    pub fn create(config: Config, cloud: bool) -> Result<Self, SetupError> {
        crate::init_logging();
        config.ensure_directories()?;

        let mut collaborators = Collaborators::new(Box::new(FfmpegBackend::new(
            &config.ffmpeg_path,
            &config.ffprobe_path,
        )));

        if config.audio_extraction_enabled {
            collaborators = collaborators.with_audio(Box::new(FfmpegAudioExtractor::new(
                &config.ffmpeg_path,
                config.audio_sample_rate,
            )));
        }

        let gemini = match GeminiClient::new(config.gemini_api_key.clone(), config.gemini_models()) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("⚠️ Gemini disabled: {}", e);
                None
            }
        };

        if let Some(transcriber) = build_transcriber(&config, gemini.as_ref()) {
            collaborators = collaborators.with_transcriber(transcriber);
        }
        if let Some(client) = gemini {
            collaborators = collaborators.with_summarizer(Box::new(GeminiSummarizer::new(client)));
        }
        if cloud {
            let uploader = GcsUploader::new(
                config.cloud_bucket_name.clone(),
                config.gcs_access_token.clone(),
            )?
            .with_project(config.cloud_project_id.clone());
            collaborators = collaborators.with_uploader(Box::new(uploader));
        }

        info!(
            "🎬 VideoSummarizer: created (interval {}s, threshold {})",
            config.frame_extraction_rate, config.keyframe_threshold
        );
        Ok(Self {
            pipeline: VideoPipeline::new(config, collaborators),
            cancel: CancelFlag::new(),
        })
    }

    pub fn config(&self) -> &Config {
        self.pipeline.config()
    }

    /// 读取视频元数据，不解码
    pub fn probe(&self, path: &Path) -> Result<VideoMetadata, VideoError> {
        probe_video(&self.config().ffprobe_path, path)
    }

    pub fn summarize_video(&self, path: &Path, description: &str) -> Result<PipelineResult, PipelineError> {
        self.pipeline.process_with_cancel(path, description, &self.cancel)
    }

    pub fn summarize_batch(
        &self,
        paths: &[PathBuf],
        description: &str,
    ) -> Result<Vec<Result<PipelineResult, PipelineError>>, PipelineError> {
        self.pipeline.process_batch(paths, description)
    }

    /// 请求取消正在进行的处理，之后的调用也会立即返回 Cancelled
    pub fn cancel(&self) {
        self.cancel.cancel()
    }
}

/// Gemini 优先，本地 whisper 兜底；两者都没有时不转写
fn build_transcriber(config: &Config, gemini: Option<&GeminiClient>) -> Option<Box<dyn Transcriber>> {
    let whisper = config.whisper_model_path.as_ref().map(|model| {
        Box::new(
            WhisperCliTranscriber::new(&config.whisper_cli_path, model, &config.audio_language)
                .with_scratch_dir(&config.temp_dir),
        ) as Box<dyn Transcriber>
    });
    let gemini = gemini.map(|client| {
        Box::new(GeminiTranscriber::new(client.clone(), &config.audio_language)) as Box<dyn Transcriber>
    });

    match (gemini, whisper) {
        (Some(primary), Some(fallback)) => Some(Box::new(FallbackTranscriber::new(primary, fallback))),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => {
            warn!("⚠️ No transcriber available, summaries will use keyframes");
            None
        }
    }
}

impl Drop for VideoSummarizer {
    fn drop(&mut self) {
        info!("🗑️ VideoSummarizer: released");
    }
}
