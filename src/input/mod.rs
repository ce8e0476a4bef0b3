/// 视频输入系统 (Video Input System)
///
/// 控制器按需拉取帧, 每帧单一所有者:
/// 控制器读取 → 借给检测器/跟踪器 → 移交给存储线程
/// - LiveCamera: 实时相机 (采集线程通过有界通道推送)
/// - FileVideo:  本地视频帧目录 (按文件名顺序读取)
/// - StillImage: 静态图片 (每次返回同一帧)
pub mod camera;
pub mod still;
pub mod video;

pub use camera::{CameraFeed, LiveCamera};
pub use still::StillImage;
pub use video::FileVideo;

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::info;

use crate::config::{SourceConfig, SourceKind};
use crate::error::{CsmError, Result};
use crate::geometry::BoundingBox;

/// 单帧图像
#[derive(Clone, Debug)]
pub struct Frame {
    index: u64,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// 源内帧序号
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// 在帧上绘制目标框 (超出画面部分自动裁剪)
    pub fn draw_box(&mut self, bbox: &BoundingBox, color: Rgb<u8>) {
        if bbox.width() <= 0 || bbox.height() <= 0 {
            return;
        }
        let rect = Rect::at(bbox.left(), bbox.top()).of_size(bbox.width() as u32, bbox.height() as u32);
        draw_hollow_rect_mut(&mut self.image, rect, color);
    }
}

/// 图像源统一接口
pub trait FrameSource: Send {
    /// 拉取下一帧, 无更多数据时返回 `SourceExhausted`
    fn capture(&mut self) -> Result<Frame>;

    /// 释放资源 (可重复调用)
    fn release(&mut self);

    fn name(&self) -> &str;
}

/// 按配置打开图像源
///
/// 实时相机额外返回采集端 `CameraFeed`, 由调用方的采集线程推送帧
pub fn open_source(config: &SourceConfig) -> Result<(Box<dyn FrameSource>, Option<CameraFeed>)> {
    let require_path = || {
        config
            .path
            .clone()
            .ok_or(CsmError::MissingSourcePath { kind: config.kind })
    };

    match config.kind {
        SourceKind::LiveCamera => {
            let (feed, camera) = LiveCamera::channel(2, config.capture_timeout());
            info!("📷 图像源: 实时相机");
            Ok((Box::new(camera), Some(feed)))
        }
        SourceKind::FileVideo => {
            let video = FileVideo::open(require_path()?)?;
            info!("🎞️ 图像源: 本地视频 ({} 帧)", video.len());
            Ok((Box::new(video), None))
        }
        SourceKind::StillImage => {
            let still = StillImage::open(require_path()?, Some((config.width, config.height)))?;
            info!("🖼️ 图像源: 静态图片");
            Ok((Box::new(still), None))
        }
    }
}

impl SourceConfig {
    pub fn capture_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.capture_timeout_ms)
    }
}
