//! 结构相似度（SSIM）
//!
//! 在亮度通道上以 7x7 均匀窗口滑动计算 SSIM，取所有完整窗口的平均值。
//! 窗口统计量通过积分图求得，每个窗口 O(1)。

use super::error::VideoError;
use super::frame::GrayFrame;
use rayon::prelude::*;

const WINDOW: usize = 7;
const DATA_RANGE: f64 = 255.0;
const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// 帧相似度评分器（无状态）
#[derive(Debug, Clone, Copy, Default)]
pub struct SimilarityScorer;

impl SimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn score_gray(&self, a: &GrayFrame, b: &GrayFrame) -> Result<f64, VideoError> {
        ssim(a, b)
    }
}

/// Mean SSIM of two same-sized grayscale frames, in [-1, 1].
pub fn ssim(a: &GrayFrame, b: &GrayFrame) -> Result<f64, VideoError> {
    if a.dimensions() != b.dimensions() {
        return Err(VideoError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }

    let w = a.width as usize;
    let h = a.height as usize;
    if w == 0 || h == 0 {
        return Ok(1.0);
    }

    let win = WINDOW.min(w).min(h);
    let tables = IntegralTables::build(&a.data, &b.data, w, h);

    let np = (win * win) as f64;
    let cov_norm = if win > 1 { np / (np - 1.0) } else { 1.0 };
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let rows = h - win + 1;
    let cols = w - win + 1;

    // 每行并行求和，再按行序累加，保证结果与线程调度无关
    let row_sums: Vec<f64> = (0..rows)
        .into_par_iter()
        .map(|y| {
            let mut acc = 0.0;
            for x in 0..cols {
                let s = tables.window(x, y, win);
                let ux = s.x as f64 / np;
                let uy = s.y as f64 / np;
                let uxx = s.xx as f64 / np;
                let uyy = s.yy as f64 / np;
                let uxy = s.xy as f64 / np;

                let vx = cov_norm * (uxx - ux * ux);
                let vy = cov_norm * (uyy - uy * uy);
                let vxy = cov_norm * (uxy - ux * uy);

                let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
                let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
                acc += num / den;
            }
            acc
        })
        .collect();

    let total: f64 = row_sums.iter().sum();
    Ok(total / (rows * cols) as f64)
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowSums {
    x: u64,
    y: u64,
    xx: u64,
    yy: u64,
    xy: u64,
}

/// 五张积分图：x, y, x², y², xy
struct IntegralTables {
    stride: usize,
    sums: Vec<WindowSums>,
}

impl IntegralTables {
    fn build(a: &[u8], b: &[u8], w: usize, h: usize) -> Self {
        let stride = w + 1;
        let mut sums = vec![WindowSums::default(); stride * (h + 1)];

        for y in 0..h {
            let mut row = WindowSums::default();
            for x in 0..w {
                let pa = a[y * w + x] as u64;
                let pb = b[y * w + x] as u64;
                row.x += pa;
                row.y += pb;
                row.xx += pa * pa;
                row.yy += pb * pb;
                row.xy += pa * pb;

                let above = sums[y * stride + x + 1];
                sums[(y + 1) * stride + x + 1] = WindowSums {
                    x: above.x + row.x,
                    y: above.y + row.y,
                    xx: above.xx + row.xx,
                    yy: above.yy + row.yy,
                    xy: above.xy + row.xy,
                };
            }
        }

        Self { stride, sums }
    }

    fn window(&self, x: usize, y: usize, win: usize) -> WindowSums {
        let tl = self.sums[y * self.stride + x];
        let tr = self.sums[y * self.stride + x + win];
        let bl = self.sums[(y + win) * self.stride + x];
        let br = self.sums[(y + win) * self.stride + x + win];

        WindowSums {
            x: br.x + tl.x - tr.x - bl.x,
            y: br.y + tl.y - tr.y - bl.y,
            xx: br.xx + tl.xx - tr.xx - bl.xx,
            yy: br.yy + tl.yy - tr.yy - bl.yy,
            xy: br.xy + tl.xy - tr.xy - bl.xy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::frame::Frame;

    fn gradient(width: u32, height: u32, offset: u8) -> GrayFrame {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| ((x * 3 + y * 2) as u8).wrapping_add(offset)))
            .collect();
        GrayFrame::new(width, height, data)
    }

    fn checkerboard(width: u32, height: u32, cell: u32) -> GrayFrame {
        let data = (0..height)
            .flat_map(|y| {
                (0..width).map(move |x| if ((x / cell) + (y / cell)) % 2 == 0 { 255 } else { 0 })
            })
            .collect();
        GrayFrame::new(width, height, data)
    }

    #[test]
    fn test_identical_frames_score_exactly_one() {
        let a = gradient(64, 48, 0);
        assert_eq!(ssim(&a, &a).unwrap(), 1.0);

        let flat = GrayFrame::new(32, 32, vec![17; 32 * 32]);
        assert_eq!(ssim(&flat, &flat.clone()).unwrap(), 1.0);
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let a = gradient(32, 32, 0);
        let b = gradient(32, 16, 0);
        let err = ssim(&a, &b).unwrap_err();
        assert!(matches!(err, VideoError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_structure_change_scores_low() {
        let flat = GrayFrame::new(64, 64, vec![128; 64 * 64]);
        let board = checkerboard(64, 64, 2);
        let score = ssim(&flat, &board).unwrap();
        assert!(score < 0.1, "score was {score}");
    }

    #[test]
    fn test_inverted_structure_scores_negative() {
        let board = checkerboard(64, 64, 2);
        let inverted = GrayFrame::new(64, 64, board.data.iter().map(|v| 255 - v).collect());
        let score = ssim(&board, &inverted).unwrap();
        assert!(score < 0.0, "score was {score}");
        assert!(score >= -1.0);
    }

    #[test]
    fn test_small_brightness_shift_scores_high() {
        let a = gradient(64, 64, 0);
        let b = GrayFrame::new(64, 64, a.data.iter().map(|v| v.saturating_add(4)).collect());
        let score = ssim(&a, &b).unwrap();
        assert!(score > 0.9, "score was {score}");
    }

    #[test]
    fn test_symmetric_and_deterministic() {
        let a = gradient(40, 30, 0);
        let b = checkerboard(40, 30, 3);
        let ab = ssim(&a, &b).unwrap();
        assert_eq!(ab, ssim(&b, &a).unwrap());
        assert_eq!(ab, ssim(&a, &b).unwrap());
    }

    #[test]
    fn test_tiny_frames_shrink_window() {
        let a = GrayFrame::new(3, 2, vec![0, 50, 100, 150, 200, 250]);
        assert_eq!(ssim(&a, &a).unwrap(), 1.0);

        let one = GrayFrame::new(1, 1, vec![10]);
        assert_eq!(ssim(&one, &one).unwrap(), 1.0);
    }

    #[test]
    fn test_red_green_flat_frames() {
        let scorer = SimilarityScorer::new();
        let red = Frame::solid(32, 32, [255, 0, 0], 0).to_gray();
        let green = Frame::solid(32, 32, [0, 255, 0], 1).to_gray();

        assert_eq!(scorer.score_gray(&red, &red).unwrap(), 1.0);
        // 亮度 76 与 149 的纯色图只剩亮度项：(2·76·149 + C1) / (76² + 149² + C1)
        let c1 = (K1 * DATA_RANGE).powi(2);
        let expected = (2.0 * 76.0 * 149.0 + c1) / (76.0f64.powi(2) + 149.0f64.powi(2) + c1);
        let score = scorer.score_gray(&red, &green).unwrap();
        assert!((score - expected).abs() < 1e-9, "score was {score}");
        assert!((score - 0.8096).abs() < 1e-3);
    }
}
