//! 静态图片输入 - 每次采集返回同一帧 (可选缩放到指定分辨率)

use std::path::Path;

use image::{imageops, RgbImage};

use super::{Frame, FrameSource};
use crate::error::Result;

pub struct StillImage {
    image: RgbImage,
    count: u64,
}

impl StillImage {
    /// 加载图片, `res` 为 Some 时缩放 (Triangle快速算法)
    pub fn open(path: impl AsRef<Path>, res: Option<(u32, u32)>) -> Result<Self> {
        let image = image::open(path.as_ref())?.to_rgb8();
        Ok(Self::from_image(image, res))
    }

    pub fn from_image(image: RgbImage, res: Option<(u32, u32)>) -> Self {
        let image = match res {
            Some((w, h)) if (w, h) != image.dimensions() => {
                imageops::resize(&image, w, h, imageops::FilterType::Triangle)
            }
            _ => image,
        };
        Self { image, count: 0 }
    }
}

impl FrameSource for StillImage {
    fn capture(&mut self) -> Result<Frame> {
        let frame = Frame::new(self.count, self.image.clone());
        self.count += 1;
        Ok(frame)
    }

    // 无需释放
    fn release(&mut self) {}

    fn name(&self) -> &str {
        "still-image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resizes_and_repeats() {
        let mut still = StillImage::from_image(RgbImage::new(64, 48), Some((32, 24)));
        let a = still.capture().unwrap();
        let b = still.capture().unwrap();
        assert_eq!((a.width(), a.height()), (32, 24));
        assert_eq!(b.index(), 1);
        still.release();
        assert!(still.capture().is_ok());
    }
}
