//! 单目标跟踪公共组件
//! Common components for single-object tracking

use image::{imageops, GrayImage};
use imageproc::template_matching::{find_extremes, match_template, MatchTemplateMethod};

use crate::geometry::BoundingBox;
use crate::input::Frame;

/// 最小可跟踪尺寸 (像素)
const MIN_TEMPLATE_SIZE: i32 = 4;

// ========== 跟踪器统一接口 ==========

/// 单目标跟踪器 Trait
///
/// 有状态: 先用 `init` 锁定目标, 之后每帧调用 `update`
pub trait Tracker: Send {
    /// 在给定帧上用目标框初始化, 返回是否成功
    fn init(&mut self, frame: &Frame, bbox: &BoundingBox) -> bool;

    /// 在新帧中跟踪目标, 丢失时返回 None
    fn update(&mut self, frame: &Frame) -> Option<BoundingBox>;

    fn name(&self) -> &str;
}

// ========== 模板匹配跟踪器 ==========

/// 模板匹配跟踪器
///
/// 初始化时截取目标灰度模板, 之后在上一位置外扩 `search_margin` 的窗口内
/// 做归一化平方差匹配. 模板不随帧更新, 累积漂移由周期性检测重置修正.
pub struct TemplateTracker {
    template: Option<GrayImage>,
    bbox: Option<BoundingBox>,
    search_margin: i32,
    max_error: f32,
}

impl TemplateTracker {
    /// # 参数
    /// - `search_margin`: 搜索窗口外扩像素 (16-64)
    /// - `max_error`: 归一化平方差上限, 超过视为丢失 (0.1-0.5)
    pub fn new(search_margin: i32, max_error: f32) -> Self {
        Self {
            template: None,
            bbox: None,
            search_margin,
            max_error,
        }
    }
}

impl Default for TemplateTracker {
    fn default() -> Self {
        Self::new(32, 0.25)
    }
}

impl Tracker for TemplateTracker {
    fn init(&mut self, frame: &Frame, bbox: &BoundingBox) -> bool {
        self.template = None;
        self.bbox = None;

        let (fw, fh) = (frame.width() as i32, frame.height() as i32);
        let l = bbox.left().clamp(0, fw);
        let t = bbox.top().clamp(0, fh);
        let r = bbox.right().clamp(0, fw);
        let b = bbox.bottom().clamp(0, fh);
        if r - l < MIN_TEMPLATE_SIZE || b - t < MIN_TEMPLATE_SIZE {
            return false;
        }

        let clipped = match BoundingBox::new(l, t, r, b) {
            Ok(clipped) => clipped,
            Err(_) => return false,
        };

        let gray = imageops::grayscale(frame.image());
        let template =
            imageops::crop_imm(&gray, l as u32, t as u32, (r - l) as u32, (b - t) as u32).to_image();

        self.template = Some(template);
        self.bbox = Some(clipped);
        true
    }

    fn update(&mut self, frame: &Frame) -> Option<BoundingBox> {
        let (template, last) = match (&self.template, self.bbox) {
            (Some(template), Some(last)) => (template, last),
            _ => return None,
        };
        let (tw, th) = (template.width() as i32, template.height() as i32);
        let (fw, fh) = (frame.width() as i32, frame.height() as i32);

        // 搜索窗口: 上一位置外扩, 裁剪到画面内
        let wl = (last.left() - self.search_margin).max(0);
        let wt = (last.top() - self.search_margin).max(0);
        let wr = (last.right() + self.search_margin).min(fw);
        let wb = (last.bottom() + self.search_margin).min(fh);
        if wr - wl < tw || wb - wt < th {
            return None;
        }

        let gray = imageops::grayscale(frame.image());
        let region =
            imageops::crop_imm(&gray, wl as u32, wt as u32, (wr - wl) as u32, (wb - wt) as u32)
                .to_image();

        let scores = match_template(&region, template, MatchTemplateMethod::SumOfSquaredErrorsNormalized);
        let extremes = find_extremes(&scores);
        if !extremes.min_value.is_finite() || extremes.min_value > self.max_error {
            return None;
        }

        let (x, y) = extremes.min_value_location;
        let found = BoundingBox::from_xywh(wl + x as i32, wt + y as i32, tw, th).ok()?;
        self.bbox = Some(found);
        Some(found)
    }

    fn name(&self) -> &str {
        "template"
    }
}
