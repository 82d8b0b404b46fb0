//! 视频解码边界
//!
//! `VideoBackend` 负责打开视频，`VideoSource` 顺序吐出解码后的 RGB 帧。
//! 默认实现通过 ffprobe 读取元数据，再把 ffmpeg 的 rawvideo 输出接到管道上逐帧读取。

use super::error::VideoError;
use super::frame::Frame;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// 已打开的解码句柄。句柄在 drop 时释放底层资源
pub trait VideoSource: Send {
    /// 原生帧率，未知时可能为 0 或 NaN
    fn frame_rate(&self) -> f64;

    /// 下一帧；流结束返回 `Ok(None)`
    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError>;
}

pub trait VideoBackend: Send + Sync {
    /// 打不开时返回 `VideoError::SourceUnavailable`，与流结束区分
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, VideoError>;
}

/// 视频元数据
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_secs: f64,
    pub codec: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    codec_name: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// 解析 "30000/1001" 形式的帧率
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => rate.trim().parse().ok(),
    }
}

fn parse_probe(path: &Path, json: &[u8]) -> Result<VideoMetadata, VideoError> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| VideoError::unavailable(path, format!("unreadable ffprobe output: {}", e)))?;

    let stream = probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| VideoError::unavailable(path, "no video stream found"))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(VideoError::unavailable(path, "video stream has no dimensions")),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .filter(|r| r.is_finite() && *r > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(0.0);

    let format = probe.format;
    let duration_secs = stream
        .duration
        .as_deref()
        .or(format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse().ok())
        .unwrap_or(0.0);

    Ok(VideoMetadata {
        width,
        height,
        fps,
        duration_secs,
        codec: stream.codec_name.unwrap_or_else(|| "unknown".to_string()),
        format: format
            .and_then(|f| f.format_name)
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

/// 用 ffprobe 读取首个视频流的元数据
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoMetadata, VideoError> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
        .arg("stream=width,height,avg_frame_rate,r_frame_rate,codec_name,duration:format=format_name,duration")
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| VideoError::unavailable(path, format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VideoError::unavailable(path, stderr.trim().to_string()));
    }

    parse_probe(path, &output.stdout)
}

/// 文件存在且 ffprobe 能识别出视频流
pub fn validate_video_file(ffprobe: &Path, path: &Path) -> Result<VideoMetadata, VideoError> {
    if !path.is_file() {
        return Err(VideoError::unavailable(path, "file not found"));
    }
    probe_video(ffprobe, path)
}

/// ffmpeg/ffprobe 子进程解码后端
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn VideoSource>, VideoError> {
        let metadata = validate_video_file(&self.ffprobe, path)?;
        info!(
            "🎬 Opened {:?}: {}x{} @ {:.3} fps, {:.1}s, codec={}",
            path, metadata.width, metadata.height, metadata.fps, metadata.duration_secs, metadata.codec
        );
        let source = FfmpegSource::spawn(&self.ffmpeg, path, metadata)?;
        Ok(Box::new(source))
    }
}

/// ffmpeg 失败时保留的 stderr 行数
const STDERR_TAIL_LINES: usize = 20;

/// 后台线程持续读 stderr（避免管道写满阻塞 ffmpeg），只保留最后几行
fn collect_stderr_tail(stderr: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        for line in BufReader::new(stderr).split(b'\n') {
            let Ok(line) = line else { break };
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    })
}

/// 一个正在运行的 ffmpeg rawvideo 管道
pub struct FfmpegSource {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_tail: Option<JoinHandle<String>>,
    path: PathBuf,
    metadata: VideoMetadata,
    frame_size: usize,
    decoded: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn spawn(ffmpeg: &Path, path: &Path, metadata: VideoMetadata) -> Result<Self, VideoError> {
        let mut child = Command::new(ffmpeg)
            .args(["-v", "error", "-nostdin", "-noautorotate", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VideoError::unavailable(path, format!("failed to run ffmpeg: {}", e)))?;

        let stderr_tail = child.stderr.take().map(collect_stderr_tail);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(VideoError::unavailable(path, "ffmpeg stdout not captured"));
            }
        };

        let frame_size = metadata.width as usize * metadata.height as usize * 3;
        Ok(Self {
            child,
            stdout: BufReader::with_capacity(frame_size.max(8192), stdout),
            stderr_tail,
            path: path.to_path_buf(),
            metadata,
            frame_size,
            decoded: 0,
            finished: false,
        })
    }

    /// 读满一帧；返回实际读取的字节数
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, VideoError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(VideoError::Decode(e.to_string())),
            }
        }
        Ok(filled)
    }

    /// 回收子进程。非零退出：一帧都没解出来算打不开，否则算解码中途失败
    fn finish(&mut self) -> Result<(), VideoError> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| VideoError::Decode(format!("failed to reap ffmpeg: {}", e)))?;
        let stderr = self
            .stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            debug!("ffmpeg finished after {} frames", self.decoded);
            return Ok(());
        }

        let stderr = stderr.trim();
        let reason = if stderr.is_empty() {
            format!("ffmpeg exited with {}", status)
        } else {
            format!("ffmpeg exited with {}: {}", status, stderr)
        };
        error!("❌ Decoding {:?} failed after {} frames: {}", self.path, self.decoded, reason);

        if self.decoded == 0 {
            Err(VideoError::unavailable(&self.path, reason))
        } else {
            Err(VideoError::Decode(format!(
                "{} after {} frames",
                reason, self.decoded
            )))
        }
    }
}

impl VideoSource for FfmpegSource {
    fn frame_rate(&self) -> f64 {
        self.metadata.fps
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, VideoError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_size];
        let filled = self.fill(&mut buf)?;
        if filled < self.frame_size {
            if filled > 0 {
                warn!(
                    "⚠️ Truncated frame {} ({} of {} bytes), stopping",
                    self.decoded, filled, self.frame_size
                );
            }
            self.finish()?;
            return Ok(None);
        }

        let frame_number = self.decoded;
        self.decoded += 1;
        let timestamp_ms = if self.metadata.fps > 0.0 {
            (frame_number as f64 * 1000.0 / self.metadata.fps) as u64
        } else {
            0
        };

        Ok(Some(Frame::new(
            self.metadata.width,
            self.metadata.height,
            buf,
            timestamp_ms,
            frame_number,
        )))
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
        if let Some(handle) = self.stderr_tail.take() {
            let _ = handle.join();
        }
        debug!("🗑️ FfmpegSource: released decoder");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("abc"), None);
    }

    #[test]
    fn test_parse_probe() {
        let json = br#"{
            "streams": [{
                "codec_name": "h264",
                "width": 640,
                "height": 480,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "duration": "2.000000"
            }],
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "2.010000"}
        }"#;

        let meta = parse_probe(Path::new("a.mp4"), json).unwrap();
        assert_eq!(meta.width, 640);
        assert_eq!(meta.height, 480);
        assert_eq!(meta.fps, 30.0);
        assert_eq!(meta.duration_secs, 2.0);
        assert_eq!(meta.codec, "h264");
        assert!(meta.format.starts_with("mov"));
    }

    #[test]
    fn test_parse_probe_falls_back_to_r_frame_rate() {
        let json = br#"{"streams": [{"width": 10, "height": 10,
            "avg_frame_rate": "0/0", "r_frame_rate": "24/1"}]}"#;
        let meta = parse_probe(Path::new("a.mkv"), json).unwrap();
        assert_eq!(meta.fps, 24.0);
        assert_eq!(meta.codec, "unknown");
        assert_eq!(meta.duration_secs, 0.0);
    }

    #[test]
    fn test_parse_probe_without_video_stream() {
        let err = parse_probe(Path::new("a.wav"), br#"{"streams": []}"#).unwrap_err();
        assert!(matches!(err, VideoError::SourceUnavailable { .. }));
    }

    /// 写一个可执行的 sh 脚本，冒充 ffmpeg/ffprobe
    #[cfg(unix)]
    fn stub_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// 2x2 @ 1fps 的 ffprobe 输出，每帧 12 字节
    #[cfg(unix)]
    fn stub_backend(dir: &Path, ffmpeg_body: &str) -> (FfmpegBackend, PathBuf) {
        let ffprobe = stub_tool(
            dir,
            "ffprobe",
            r#"echo '{"streams":[{"width":2,"height":2,"avg_frame_rate":"1/1"}]}'"#,
        );
        let ffmpeg = stub_tool(dir, "ffmpeg", ffmpeg_body);
        let video = dir.join("clip.mp4");
        std::fs::write(&video, b"not really a video").unwrap();
        (FfmpegBackend::new(ffmpeg, ffprobe), video)
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_failure_before_first_frame_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, video) =
            stub_backend(dir.path(), "echo 'moov atom not found' >&2\nexit 1");

        let err = crate::core::video::FrameSampler::new(1.0)
            .extract_frames(&backend, &video)
            .unwrap_err();

        match err {
            VideoError::SourceUnavailable { reason, .. } => {
                assert!(reason.contains("moov atom not found"), "reason was {reason}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_failure_mid_stream_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, video) = stub_backend(
            dir.path(),
            "head -c 24 /dev/zero\necho 'corrupt packet' >&2\nexit 1",
        );

        let mut source = backend.open(&video).unwrap();
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        match source.next_frame().unwrap_err() {
            VideoError::Decode(msg) => {
                assert!(msg.contains("corrupt packet"), "message was {msg}");
                assert!(msg.contains("after 2 frames"));
            }
            other => panic!("unexpected error: {other}"),
        }
        // 失败之后不会再重复报告
        assert!(source.next_frame().unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_clean_exit_ends_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (backend, video) = stub_backend(dir.path(), "head -c 36 /dev/zero");

        let frames = crate::core::video::FrameSampler::new(1.0)
            .extract_frames(&backend, &video)
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].frame_number, 2);
        assert_eq!(frames[0].dimensions(), (2, 2));
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let backend = FfmpegBackend::default();
        let err = backend
            .open(Path::new("/definitely/not/here.mp4"))
            .err()
            .unwrap();
        assert!(matches!(err, VideoError::SourceUnavailable { .. }));
    }
}
