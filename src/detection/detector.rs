//! 检测器 (Detector)
//! 职责: 给定一帧 → 返回带类别与置信度的检测框
//!
//! 神经网络检测后端通过实现 `Detector` 接入; 本模块自带台架用的固定输出检测器.

use super::types::Detection;
use crate::error::Result;
use crate::input::Frame;

/// 目标检测统一接口
pub trait Detector: Send {
    /// 检测一帧中的所有目标 (置信度过滤由 `Perception` 统一处理)
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    fn name(&self) -> &str;
}

/// 固定输出检测器 (台架调试用)
///
/// 每帧返回配置中的同一组检测框, 超出画面的框会被裁剪
pub struct StaticDetector {
    detections: Vec<Detection>,
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }
}

impl Detector for StaticDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (w, h) = (frame.width() as i32, frame.height() as i32);
        Ok(self
            .detections
            .iter()
            .map(|d| Detection {
                left: d.left.clamp(0, w),
                top: d.top.clamp(0, h),
                right: d.right.clamp(0, w),
                bottom: d.bottom.clamp(0, h),
                ..*d
            })
            .collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}
