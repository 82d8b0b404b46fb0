use super::error::VideoError;
use super::frame::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageError};
use log::info;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const JPEG_QUALITY: u8 = 90;
pub const KEYFRAME_EXTENSION: &str = "jpg";

/// 关键帧落盘：`{base}_keyframe_{index}.jpg`
#[derive(Debug, Clone)]
pub struct KeyframeStore {
    directory: PathBuf,
}

impl KeyframeStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, base_name: &str, index: usize) -> PathBuf {
        self.directory
            .join(format!("{}_keyframe_{}.{}", base_name, index, KEYFRAME_EXTENSION))
    }

    /// 按顺序写出全部关键帧；失败时已写入的文件保留。目录总会被创建
    pub fn persist(&self, keyframes: &[Frame], base_name: &str) -> Result<Vec<PathBuf>, VideoError> {
        fs::create_dir_all(&self.directory).map_err(|source| VideoError::Persistence {
            index: 0,
            path: self.directory.clone(),
            source,
        })?;

        let mut paths = Vec::with_capacity(keyframes.len());
        for (index, frame) in keyframes.iter().enumerate() {
            let path = self.path_for(base_name, index);
            write_jpeg(frame, &path).map_err(|source| VideoError::Persistence {
                index,
                path: path.clone(),
                source,
            })?;
            paths.push(path);
        }

        info!("💾 Saved {} keyframes to {:?}", paths.len(), self.directory);
        Ok(paths)
    }
}

fn write_jpeg(frame: &Frame, path: &Path) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY)
        .encode(&frame.data, frame.width, frame.height, ColorType::Rgb8)
        .map_err(|e| match e {
            ImageError::IoError(io) => io,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        })?;
    writer.flush()
}
