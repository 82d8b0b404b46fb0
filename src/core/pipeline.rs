//! 处理流水线：抽帧 → 关键帧筛选 → 落盘，再接音频、转写、摘要和上传。
//!
//! 只有视频本身读不了（或帧尺寸不一致、被取消）才会中止；其余协作方失败都降级处理。

use crate::core::audio::{AudioExtractor, Transcriber};
use crate::core::config::Config;
use crate::core::summary::{
    summarize_or_placeholder, Summarizer, SummaryRequest, SummaryStore, SUMMARY_ERROR_PLACEHOLDER,
};
use crate::core::upload::Uploader;
use crate::core::video::{
    CancelFlag, FrameSampler, KeyframeSelector, KeyframeStore, VideoBackend, VideoError,
};
use log::{error, info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
    #[error("{path:?} would overwrite the outputs of {first:?} (both named '{name}')")]
    DuplicateName {
        name: String,
        path: PathBuf,
        first: PathBuf,
    },
}

/// 外部协作方，全部可替换为测试替身
pub struct Collaborators {
    pub backend: Box<dyn VideoBackend>,
    pub audio: Option<Box<dyn AudioExtractor>>,
    pub transcriber: Option<Box<dyn Transcriber>>,
    pub summarizer: Option<Box<dyn Summarizer>>,
    pub uploader: Option<Box<dyn Uploader>>,
}

impl Collaborators {
    pub fn new(backend: Box<dyn VideoBackend>) -> Self {
        Self {
            backend,
            audio: None,
            transcriber: None,
            summarizer: None,
            uploader: None,
        }
    }

    pub fn with_audio(mut self, audio: Box<dyn AudioExtractor>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_transcriber(mut self, transcriber: Box<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_uploader(mut self, uploader: Box<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub video_name: String,
    pub keyframes: Vec<PathBuf>,
    pub summary: String,
    pub summary_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub transcription: String,
    pub uploaded: Vec<String>,
}

pub struct VideoPipeline {
    config: Config,
    collaborators: Collaborators,
}

pub fn video_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".to_string())
}

impl VideoPipeline {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn process(&self, video: &Path, description: &str) -> Result<PipelineResult, PipelineError> {
        self.process_with_cancel(video, description, &CancelFlag::new())
    }

    pub fn process_with_cancel(
        &self,
        video: &Path,
        description: &str,
        cancel: &CancelFlag,
    ) -> Result<PipelineResult, PipelineError> {
        let name = video_name(video);
        info!("🚀 Processing {:?} as '{}'", video, name);

        let audio_path = self.extract_audio(video, &name);
        let keyframes = self.extract_keyframes(video, &name, cancel)?;
        let transcription = self.transcribe(audio_path.as_deref());

        let request = if transcription.is_empty() {
            SummaryRequest::Keyframes {
                paths: keyframes.clone(),
                context: description.to_string(),
            }
        } else {
            SummaryRequest::Transcript {
                text: transcription.clone(),
                context: description.to_string(),
            }
        };
        let summary = match &self.collaborators.summarizer {
            Some(summarizer) => summarize_or_placeholder(summarizer.as_ref(), &request),
            None => {
                warn!("⚠️ No summarizer configured");
                SUMMARY_ERROR_PLACEHOLDER.to_string()
            }
        };

        let summary_path = match SummaryStore::new(&self.config.summaries_dir).save(&summary, &name) {
            Ok(path) => Some(path),
            Err(e) => {
                error!("❌ {}", e);
                None
            }
        };

        let uploaded = self.upload(&keyframes, summary_path.as_deref(), audio_path.as_deref());

        info!("✅ Finished '{}': {} keyframes", name, keyframes.len());
        Ok(PipelineResult {
            video_name: name,
            keyframes,
            summary,
            summary_path,
            audio_path,
            transcription,
            uploaded,
        })
    }

    /// 每个视频一个任务，结果顺序与输入一致。
    ///
    /// 产物按文件名（不含扩展名）命名，同名的后续视频直接报 `DuplicateName`，不会处理。
    pub fn process_batch(
        &self,
        videos: &[PathBuf],
        description: &str,
    ) -> Result<Vec<Result<PipelineResult, PipelineError>>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        let mut owners: HashMap<String, &PathBuf> = HashMap::new();
        let jobs: Vec<(&PathBuf, Option<PipelineError>)> = videos
            .iter()
            .map(|video| {
                let name = video_name(video);
                match owners.get(&name) {
                    Some(first) => {
                        let err = PipelineError::DuplicateName {
                            name,
                            path: video.clone(),
                            first: (*first).clone(),
                        };
                        error!("❌ {}", err);
                        (video, Some(err))
                    }
                    None => {
                        owners.insert(name, video);
                        (video, None)
                    }
                }
            })
            .collect();

        info!("📦 Batch of {} videos on {} workers", videos.len(), pool.current_num_threads());
        Ok(pool.install(|| {
            jobs.into_par_iter()
                .map(|(video, rejected)| match rejected {
                    Some(err) => Err(err),
                    None => self.process(video, description),
                })
                .collect()
        }))
    }

    fn extract_audio(&self, video: &Path, name: &str) -> Option<PathBuf> {
        if !self.config.audio_extraction_enabled {
            return None;
        }
        let extractor = self.collaborators.audio.as_ref()?;
        let output = self.config.audio_dir.join(format!("{}.wav", name));

        match extractor.extract_audio(video, &output) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("⚠️ Error extracting audio: {}", e);
                None
            }
        }
    }

    fn extract_keyframes(
        &self,
        video: &Path,
        name: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<PathBuf>, PipelineError> {
        let frames = FrameSampler::new(self.config.frame_extraction_rate)
            .with_max_dimension(self.config.max_frame_dimension)
            .with_cancel_flag(cancel.clone())
            .extract_frames(self.collaborators.backend.as_ref(), video)?;

        let keyframes = KeyframeSelector::new(self.config.keyframe_threshold)
            .with_cancel_flag(cancel.clone())
            .select(frames)?;

        let store = KeyframeStore::new(&self.config.keyframes_dir);
        match store.persist(&keyframes, name) {
            Ok(paths) => Ok(paths),
            Err(VideoError::Persistence { index, path, source }) => {
                error!("❌ Failed to write keyframe {} ({:?}): {}", index, path, source);
                // 已写入的前缀仍然有效
                Ok((0..index).map(|i| store.path_for(name, i)).collect())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transcribe(&self, audio: Option<&Path>) -> String {
        let (Some(audio), Some(transcriber)) = (audio, self.collaborators.transcriber.as_ref()) else {
            return String::new();
        };
        if !audio.exists() {
            warn!("⚠️ Audio file {:?} missing, skipping transcription", audio);
            return String::new();
        }

        match transcriber.transcribe(audio) {
            Ok(text) => {
                let text = text.trim().to_string();
                info!("✅ Audio transcription complete ({} chars)", text.len());
                text
            }
            Err(e) => {
                warn!("⚠️ Transcription failed: {}", e);
                String::new()
            }
        }
    }

    fn upload(&self, keyframes: &[PathBuf], summary: Option<&Path>, audio: Option<&Path>) -> Vec<String> {
        let Some(uploader) = self.collaborators.uploader.as_ref() else {
            return Vec::new();
        };

        let targets = keyframes
            .iter()
            .map(|p| ("keyframes", p.as_path()))
            .chain(summary.map(|p| ("summaries", p)))
            .chain(audio.map(|p| ("audio", p)));

        let mut uploaded = Vec::new();
        for (prefix, path) in targets {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match uploader.upload(path, &format!("{}/{}", prefix, file_name)) {
                Ok(uri) => uploaded.push(uri),
                Err(e) => warn!("⚠️ Upload of {:?} failed: {}", path, e),
            }
        }
        uploaded
    }
}
