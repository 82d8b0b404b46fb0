//! 关键帧筛选
//!
//! 单次遍历：每个候选帧与「上一个保留的关键帧」比较（而不是上一个采样帧），
//! 这样缓慢漂移的画面累积到足够差异时也会被捕获。

use super::error::VideoError;
use super::frame::{Frame, GrayFrame};
use super::sampler::CancelFlag;
use super::similarity::SimilarityScorer;
use log::{debug, info};

/// 筛选统计
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SelectionStats {
    pub candidates: usize,
    pub kept: usize,
    pub min_score: Option<f64>,
}

pub struct KeyframeSelector {
    threshold: f64,
    scorer: SimilarityScorer,
    cancel: CancelFlag,
}

impl KeyframeSelector {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            scorer: SimilarityScorer::new(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn select(&self, frames: Vec<Frame>) -> Result<Vec<Frame>, VideoError> {
        self.select_with_stats(frames).map(|(keyframes, _)| keyframes)
    }

    pub fn select_with_stats(
        &self,
        frames: Vec<Frame>,
    ) -> Result<(Vec<Frame>, SelectionStats), VideoError> {
        let mut stats = SelectionStats {
            candidates: frames.len(),
            ..Default::default()
        };
        let mut output: Vec<Frame> = Vec::new();
        // 上一个保留帧的灰度图，避免重复转换
        let mut last_kept: Option<GrayFrame> = None;

        for candidate in frames {
            if self.cancel.is_cancelled() {
                return Err(VideoError::Cancelled);
            }

            let gray = candidate.to_gray();
            let keep = match &last_kept {
                None => {
                    debug!("Frame {} kept: first frame", candidate.frame_number);
                    true
                }
                Some(reference) => {
                    let score = self.scorer.score_gray(reference, &gray)?;
                    stats.min_score = Some(stats.min_score.map_or(score, |m| m.min(score)));
                    let keep = score < self.threshold;
                    debug!(
                        "Frame {} ssim={:.4} threshold={} -> {}",
                        candidate.frame_number,
                        score,
                        self.threshold,
                        if keep { "keep" } else { "drop" }
                    );
                    keep
                }
            };

            if keep {
                last_kept = Some(gray);
                output.push(candidate);
            }
        }

        stats.kept = output.len();
        info!(
            "🔑 Selected {} keyframes from {} samples (threshold {})",
            stats.kept, stats.candidates, self.threshold
        );
        Ok((output, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::similarity::ssim;

    fn shade(value: u8, n: u64) -> Frame {
        Frame::solid(32, 32, [value, value, value], n)
    }

    /// 每帧都不同的条纹图
    fn distinct_frames(count: u64) -> Vec<Frame> {
        (0..count)
            .map(|n| {
                let data = (0..32u32)
                    .flat_map(|y| {
                        (0..32u32).flat_map(move |x| {
                            let v = if (x + y * (n as u32 + 1)) % (n as u32 + 2) == 0 { 250 } else { 5 };
                            [v, v, v]
                        })
                    })
                    .collect();
                Frame::new(32, 32, data, 0, n)
            })
            .collect()
    }

    #[test]
    fn test_empty_input() {
        let selector = KeyframeSelector::new(0.5);
        assert!(selector.select(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_single_frame_always_kept() {
        for threshold in [-5.0, -1.0, 0.0, 0.5, 1.0, 2.0] {
            let out = KeyframeSelector::new(threshold).select(vec![shade(9, 0)]).unwrap();
            assert_eq!(out.len(), 1);
        }
    }

    #[test]
    fn test_identical_frames_keep_only_first() {
        let frames: Vec<Frame> = (0..10).map(|n| shade(100, n)).collect();
        for threshold in [0.0, 0.5, 0.99, 1.0] {
            let out = KeyframeSelector::new(threshold).select(frames.clone()).unwrap();
            assert_eq!(out.len(), 1);
            assert_eq!(out[0].frame_number, 0);
        }
    }

    #[test]
    fn test_threshold_above_max_keeps_distinct_frames() {
        let frames = distinct_frames(6);
        let out = KeyframeSelector::new(1.0).select(frames.clone()).unwrap();
        assert_eq!(out.len(), frames.len());
    }

    #[test]
    fn test_threshold_at_min_keeps_only_first() {
        let frames = distinct_frames(6);
        let out = KeyframeSelector::new(-1.0).select(frames).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_red_green_are_both_kept() {
        let frames = vec![
            Frame::solid(64, 48, [255, 0, 0], 0),
            Frame::solid(64, 48, [0, 255, 0], 30),
        ];
        let (out, stats) = KeyframeSelector::new(0.9).select_with_stats(frames).unwrap();
        assert_eq!(out.len(), 2);
        assert!(stats.min_score.unwrap() < 0.9);
    }

    #[test]
    fn test_red_green_at_default_threshold_keeps_one() {
        // 纯红/纯绿灰度为 76/149，SSIM ≈ 0.81，高于默认阈值 0.5
        let frames = vec![
            Frame::solid(64, 48, [255, 0, 0], 0),
            Frame::solid(64, 48, [0, 255, 0], 30),
        ];
        let (out, stats) = KeyframeSelector::new(0.5).select_with_stats(frames).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].frame_number, 0);
        let score = stats.min_score.unwrap();
        assert!((score - 0.8096).abs() < 1e-3, "score was {score}");
    }

    #[test]
    fn test_compares_against_last_kept_not_previous() {
        // 亮度缓慢漂移：相邻帧几乎一样，但与首帧累积差异很大
        let frames: Vec<Frame> = (0..8).map(|n| shade(20 + n as u8 * 30, n as u64)).collect();

        let neighbour = ssim(&frames[0].to_gray(), &frames[1].to_gray()).unwrap();
        let drifted = ssim(&frames[0].to_gray(), &frames[7].to_gray()).unwrap();
        let threshold = 0.6;
        assert!(drifted < threshold);
        assert!(neighbour < 1.0);

        let out = KeyframeSelector::new(threshold).select(frames).unwrap();
        assert!(out.len() > 1);
        assert_eq!(out[0].frame_number, 0);

        // 每个保留帧都与上一个保留帧足够不同
        for pair in out.windows(2) {
            let s = ssim(&pair[0].to_gray(), &pair[1].to_gray()).unwrap();
            assert!(s < threshold);
        }
    }

    #[test]
    fn test_dimension_mismatch_halts() {
        let frames = vec![shade(0, 0), Frame::solid(16, 16, [255, 255, 255], 1)];
        let err = KeyframeSelector::new(0.5).select(frames).unwrap_err();
        assert!(matches!(err, VideoError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_order_preserved() {
        let frames = distinct_frames(5);
        let out = KeyframeSelector::new(1.0).select(frames).unwrap();
        let numbers: Vec<u64> = out.iter().map(|f| f.frame_number).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cancelled_selection() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = KeyframeSelector::new(0.5)
            .with_cancel_flag(cancel)
            .select(distinct_frames(3))
            .unwrap_err();
        assert!(matches!(err, VideoError::Cancelled));
    }
}
