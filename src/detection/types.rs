/// 检测系统数据结构定义
/// Data structures for the detection system
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{BoundingBox, FlowVector};

/// 检测框 (Detection bounding box)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: u32,
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub confidence: f32,
}

impl Detection {
    pub fn bbox(&self) -> Result<BoundingBox> {
        BoundingBox::new(self.left, self.top, self.right, self.bottom)
    }
}

/// 单帧跟踪结果
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrackOutcome {
    /// 跟踪成功: 新框 + 光流(旧框中心 → 新框中心)
    Tracked { bbox: BoundingBox, flow: FlowVector },
    /// 目标丢失, 需要用检测结果重置
    Lost,
}

/// 在检测结果中查找指定类别
///
/// 顺序扫描并覆盖, 多个同类目标时返回**最后一个**
pub fn find_class_in_detections(detections: &[Detection], class_id: u32) -> Option<BoundingBox> {
    let mut target = None;
    for detection in detections {
        if detection.class_id == class_id {
            target = Some(detection);
        }
    }
    target.and_then(|d| d.bbox().ok())
}
