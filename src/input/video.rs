//! 本地视频输入 (帧序列目录)
//! Local video source: a directory of frame images read in file-name order

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::{Frame, FrameSource};
use crate::error::{CsmError, Result};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct FileVideo {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    skipped: usize,
    released: bool,
}

impl FileVideo {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let entries = fs::read_dir(&dir).map_err(|e| CsmError::io(&dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_frame_file(path))
            .collect();
        files.sort();

        if files.is_empty() {
            warn!("⚠️  视频目录 {} 中没有帧图像", dir.display());
        }

        Ok(Self {
            dir,
            files,
            cursor: 0,
            skipped: 0,
            released: false,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for FileVideo {
    fn capture(&mut self) -> Result<Frame> {
        if self.released {
            return Err(CsmError::SourceExhausted("video released".to_string()));
        }
        // 无法解码的文件跳过, 游标先前移, 坏帧不会被反复读取
        while let Some(path) = self.files.get(self.cursor) {
            let index = self.cursor as u64;
            self.cursor += 1;
            match image::open(path) {
                Ok(image) => return Ok(Frame::new(index, image.to_rgb8())),
                Err(e) => {
                    self.skipped += 1;
                    warn!("⚠️  跳过无法解码的帧 {}: {}", path.display(), e);
                }
            }
        }

        Err(CsmError::SourceExhausted(format!(
            "end of {} after {} frames",
            self.dir.display(),
            self.files.len()
        )))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!(
                "🎞️ 视频已释放 ({}/{} 帧, 跳过 {} 帧)",
                self.cursor,
                self.files.len(),
                self.skipped
            );
        }
    }

    fn name(&self) -> &str {
        "file-video"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("csm-video-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_reads_frames_in_name_order() {
        let dir = scratch_dir("order");
        for (name, shade) in [("b.png", 20u8), ("a.png", 10u8), ("c.png", 30u8)] {
            RgbImage::from_pixel(4, 3, Rgb([shade, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut video = FileVideo::open(&dir).unwrap();
        assert_eq!(video.len(), 3);

        let shades: Vec<u8> = (0..3)
            .map(|_| video.capture().unwrap().image().get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(shades, vec![10, 20, 30]);
        assert!(matches!(video.capture(), Err(CsmError::SourceExhausted(_))));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_undecodable_frame_is_skipped() {
        let dir = scratch_dir("corrupt");
        RgbImage::from_pixel(4, 3, Rgb([10, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        fs::write(dir.join("b.png"), "not a png").unwrap();
        RgbImage::from_pixel(4, 3, Rgb([30, 0, 0]))
            .save(dir.join("c.png"))
            .unwrap();

        let mut video = FileVideo::open(&dir).unwrap();
        let first = video.capture().unwrap();
        let second = video.capture().unwrap();
        assert_eq!(first.image().get_pixel(0, 0).0[0], 10);
        assert_eq!(second.image().get_pixel(0, 0).0[0], 30);
        assert_eq!(second.index(), 2);
        assert_eq!(video.skipped, 1);
        assert!(matches!(video.capture(), Err(CsmError::SourceExhausted(_))));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_dir_is_io_error() {
        let missing = std::env::temp_dir().join("csm-video-does-not-exist");
        assert!(matches!(FileVideo::open(missing), Err(CsmError::Io { .. })));
    }
}
