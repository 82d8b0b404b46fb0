use super::error::VideoError;
use super::frame::Frame;
use super::source::{VideoBackend, VideoSource};
use log::{debug, info};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 协作式取消标志，每处理一帧检查一次
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// stride = round(fps × interval)，至少为 1
pub fn compute_stride(fps: f64, interval_secs: f64) -> u64 {
    let raw = (fps * interval_secs).round();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

/// 定步长抽帧器
#[derive(Debug, Clone)]
pub struct FrameSampler {
    interval_secs: f64,
    max_dimension: Option<u32>,
    cancel: CancelFlag,
}

impl FrameSampler {
    pub fn new(interval_secs: f64) -> Self {
        Self {
            interval_secs,
            max_dimension: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = (max_dimension > 0).then_some(max_dimension);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// 打开视频并抽帧；解码句柄在本函数返回前释放
    pub fn extract_frames(
        &self,
        backend: &dyn VideoBackend,
        path: &Path,
    ) -> Result<Vec<Frame>, VideoError> {
        let mut source = backend.open(path)?;
        self.sample(source.as_mut())
    }

    pub fn sample(&self, source: &mut dyn VideoSource) -> Result<Vec<Frame>, VideoError> {
        let fps = source.frame_rate();
        let stride = compute_stride(fps, self.interval_secs);
        debug!("Sampling every {} frames ({:.3} fps × {}s)", stride, fps, self.interval_secs);

        let mut frames = Vec::new();
        let mut index: u64 = 0;

        while let Some(frame) = source.next_frame()? {
            if self.cancel.is_cancelled() {
                return Err(VideoError::Cancelled);
            }

            if index % stride == 0 {
                let frame = match self.max_dimension {
                    Some(max) => frame.fit_within(max),
                    None => frame,
                };
                frames.push(frame);
            }
            index += 1;
        }

        info!("🎞️ Sampled {} of {} decoded frames", frames.len(), index);
        Ok(frames)
    }
}
