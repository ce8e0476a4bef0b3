//! 存储输出端 (Storage Sink)
//!
//! 会话结束时一次性接收全部帧并写出

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::SinkKind;
use crate::error::{CsmError, Result};
use crate::input::Frame;

pub trait StorageSink: Send + Sync {
    /// 写出一个会话的所有帧, 返回实际输出路径
    fn finalize(&self, frames: Vec<Frame>, output: &Path, frame_rate: u32) -> Result<PathBuf>;

    fn name(&self) -> &str;
}

/// 图片序列清单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
}

pub const MANIFEST_FILE: &str = "manifest.json";

/// 写出 `frame_000000.png ...` 与 `manifest.json`
#[derive(Debug, Default)]
pub struct ImageSequenceSink;

impl StorageSink for ImageSequenceSink {
    fn finalize(&self, frames: Vec<Frame>, output: &Path, frame_rate: u32) -> Result<PathBuf> {
        fs::create_dir_all(output).map_err(|e| CsmError::io(output, e))?;

        let (width, height) = frames
            .first()
            .map(|f| (f.width(), f.height()))
            .unwrap_or((0, 0));

        for (i, frame) in frames.iter().enumerate() {
            frame.image().save(output.join(format!("frame_{:06}.png", i)))?;
        }

        let manifest = Manifest {
            frame_rate,
            width,
            height,
            frame_count: frames.len(),
        };
        let manifest_path = output.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)
            .map_err(|e| CsmError::io(&manifest_path, e))?;

        info!(
            "💾 已写出 {} 帧 ({}x{} @ {}fps) → {}",
            frames.len(),
            width,
            height,
            frame_rate,
            output.display()
        );
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &str {
        "image_sequence"
    }
}

/// 不写出任何文件 (演练模式)
#[derive(Debug, Default)]
pub struct DiscardSink;

impl StorageSink for DiscardSink {
    fn finalize(&self, frames: Vec<Frame>, output: &Path, _frame_rate: u32) -> Result<PathBuf> {
        info!("🗑️  演练模式: 丢弃 {} 帧 ({})", frames.len(), output.display());
        Ok(output.to_path_buf())
    }

    fn name(&self) -> &str {
        "discard"
    }
}

/// 按配置选择输出端 (在各会话的存储线程间共享)
pub fn sink_for(kind: SinkKind) -> Arc<dyn StorageSink> {
    match kind {
        SinkKind::ImageSequence => Arc::new(ImageSequenceSink),
        SinkKind::Discard => Arc::new(DiscardSink),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn frames(n: u64) -> Vec<Frame> {
        (0..n)
            .map(|i| Frame::new(i, RgbImage::from_pixel(8, 6, Rgb([i as u8 * 40, 0, 0]))))
            .collect()
    }

    #[test]
    fn test_image_sequence_writes_frames_and_manifest() {
        let dir = std::env::temp_dir().join(format!("csm-sink-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);

        let out = ImageSequenceSink.finalize(frames(3), &dir, 25).unwrap();
        assert_eq!(out, dir);
        assert!(dir.join("frame_000000.png").exists());
        assert!(dir.join("frame_000002.png").exists());
        assert!(!dir.join("frame_000003.png").exists());

        let manifest: Manifest =
            serde_json::from_str(&fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap()).unwrap();
        assert_eq!(
            manifest,
            Manifest {
                frame_rate: 25,
                width: 8,
                height: 6,
                frame_count: 3
            }
        );

        let second = image::open(dir.join("frame_000001.png")).unwrap().to_rgb8();
        assert_eq!(*second.get_pixel(0, 0), Rgb([40, 0, 0]));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_discard_sink_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("csm-discard-{}", std::process::id()));
        let out = sink_for(SinkKind::Discard).finalize(frames(2), &dir, 30).unwrap();
        assert_eq!(out, dir);
        assert!(!dir.exists());
    }
}
