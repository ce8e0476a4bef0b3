/// 感知系统 (Perception System)
///
/// 在控制线程内同步运行, 负责目标检测与单目标跟踪
/// - Detector: 目标检测 (给定帧 → 检测框列表)
/// - Tracker:  目标追踪 (初始化后逐帧更新目标框)
/// - Perception: 组合二者, 维护当前目标框并按检测结果重置跟踪器
pub mod detector;
pub mod tracker;
pub mod types;

pub use detector::{Detector, StaticDetector};
pub use tracker::{TemplateTracker, Tracker};
pub use types::{find_class_in_detections, Detection, TrackOutcome};

use tracing::{debug, info, warn};

use crate::config::PerceptionConfig;
use crate::error::{CsmError, Result};
use crate::geometry::BoundingBox;
use crate::input::Frame;

pub struct Perception {
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    confidence_threshold: f32,
    reset_tracker_freq: u32,
    current_bbox: Option<BoundingBox>,
}

impl Perception {
    pub fn new(
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        config: &PerceptionConfig,
    ) -> Self {
        info!(
            "🎯 感知模块: 检测器={} 跟踪器={} 置信度>={:.2} 重置间隔={}帧",
            detector.name(),
            tracker.name(),
            config.confidence_threshold,
            config.reset_tracker_freq
        );
        Self {
            detector,
            tracker,
            confidence_threshold: config.confidence_threshold,
            reset_tracker_freq: config.reset_tracker_freq,
            current_bbox: None,
        }
    }

    /// 跟踪器重置间隔 (帧)
    pub fn reset_tracker_freq(&self) -> u32 {
        self.reset_tracker_freq
    }

    pub fn current_bbox(&self) -> Option<BoundingBox> {
        self.current_bbox
    }

    /// 检测并按置信度阈值过滤
    pub fn detect_objects(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let threshold = self.confidence_threshold;
        let detections: Vec<Detection> = self
            .detector
            .detect(frame)?
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .collect();
        debug!("🔍 [帧{}] 检测到 {} 个目标", frame.index(), detections.len());
        Ok(detections)
    }

    /// 用目标框初始化跟踪器
    ///
    /// 无论成功与否都会记录当前框; 失败时下一帧的更新会触发检测重置
    pub fn init_tracker(&mut self, frame: &Frame, bbox: BoundingBox) -> Result<()> {
        self.current_bbox = Some(bbox);
        if self.tracker.init(frame, &bbox) {
            Ok(())
        } else {
            Err(CsmError::TrackerInitFailure(bbox.to_wire()))
        }
    }

    /// 在新帧中跟踪目标, 成功时给出光流
    pub fn track_object_in_new_frame(&mut self, frame: &Frame) -> TrackOutcome {
        match self.tracker.update(frame) {
            Some(bbox) => {
                let flow = self
                    .current_bbox
                    .map(|prev| prev.vector_to(&bbox))
                    .unwrap_or_default();
                self.current_bbox = Some(bbox);
                TrackOutcome::Tracked { bbox, flow }
            }
            None => TrackOutcome::Lost,
        }
    }

    /// 用检测结果重新锚定跟踪器
    ///
    /// 返回重新初始化所用的框; 未找到目标类别或初始化失败时返回 None
    pub fn reset_tracker(&mut self, frame: &Frame, class_id: u32) -> Result<Option<BoundingBox>> {
        info!("🔄 [帧{}] 重置跟踪器...", frame.index());

        let detections = self.detect_objects(frame)?;
        let Some(bbox) = find_class_in_detections(&detections, class_id) else {
            warn!("⚠️  [帧{}] 未检测到类别 {}", frame.index(), class_id);
            return Ok(None);
        };

        match self.init_tracker(frame, bbox) {
            Ok(()) => Ok(Some(bbox)),
            Err(e) => {
                warn!("⚠️  重置失败: {}", e);
                Ok(None)
            }
        }
    }

    /// 清除当前目标
    pub fn clear(&mut self) {
        self.current_bbox = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ShiftTracker {
        bbox: Option<BoundingBox>,
        accept_init: bool,
    }

    impl Tracker for ShiftTracker {
        fn init(&mut self, _frame: &Frame, bbox: &BoundingBox) -> bool {
            self.bbox = Some(*bbox);
            self.accept_init
        }

        fn update(&mut self, _frame: &Frame) -> Option<BoundingBox> {
            let next = self.bbox?.translated(2, -1);
            self.bbox = Some(next);
            Some(next)
        }

        fn name(&self) -> &str {
            "shift"
        }
    }

    struct CountingDetector {
        calls: Arc<AtomicUsize>,
        detections: Vec<Detection>,
    }

    impl Detector for CountingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.detections.clone())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn det(class_id: u32, left: i32, confidence: f32) -> Detection {
        Detection {
            class_id,
            left,
            top: 0,
            right: left + 8,
            bottom: 8,
            confidence,
        }
    }

    fn frame() -> Frame {
        Frame::new(0, RgbImage::new(64, 64))
    }

    fn perception(detections: Vec<Detection>, accept_init: bool) -> (Perception, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let detector = CountingDetector {
            calls: calls.clone(),
            detections,
        };
        let tracker = ShiftTracker {
            bbox: None,
            accept_init,
        };
        let p = Perception::new(
            Box::new(detector),
            Box::new(tracker),
            &PerceptionConfig::default(),
        );
        (p, calls)
    }

    #[test]
    fn test_confidence_filter() {
        let (mut p, _) = perception(vec![det(1, 0, 0.9), det(1, 10, 0.3), det(2, 20, 0.5)], true);
        let out = p.detect_objects(&frame()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|d| d.confidence >= 0.5));
    }

    #[test]
    fn test_track_reports_flow() {
        let (mut p, _) = perception(vec![], true);
        let start = BoundingBox::new(10, 10, 20, 20).unwrap();
        p.init_tracker(&frame(), start).unwrap();
        match p.track_object_in_new_frame(&frame()) {
            TrackOutcome::Tracked { bbox, flow } => {
                assert_eq!(bbox.top_left(), (12, 9));
                assert_eq!((flow.dx, flow.dy), (2.0, -1.0));
            }
            TrackOutcome::Lost => panic!("tracker should succeed"),
        }
        assert_eq!(p.current_bbox().unwrap().top_left(), (12, 9));
    }

    #[test]
    fn test_reset_uses_last_matching_detection() {
        let (mut p, calls) = perception(vec![det(1, 0, 0.9), det(1, 30, 0.8)], true);
        let bbox = p.reset_tracker(&frame(), 1).unwrap().unwrap();
        assert_eq!(bbox.left(), 30);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.current_bbox(), Some(bbox));
    }

    #[test]
    fn test_reset_without_class() {
        let (mut p, _) = perception(vec![det(2, 0, 0.9)], true);
        assert_eq!(p.reset_tracker(&frame(), 1).unwrap(), None);
    }

    #[test]
    fn test_init_failure_is_reported() {
        let (mut p, _) = perception(vec![], false);
        let start = BoundingBox::new(0, 0, 8, 8).unwrap();
        assert!(matches!(
            p.init_tracker(&frame(), start),
            Err(CsmError::TrackerInitFailure(_))
        ));
        // 当前框仍然记录
        assert_eq!(p.current_bbox(), Some(start));
    }
}
