//! 边界框几何 (Bounding box geometry)
//!
//! 整数角点 + 浮点中心点, 构造后不可变

use serde::{Deserialize, Serialize};

use crate::error::{CsmError, Result};

/// 光流向量: 两个连续边界框中心点的位移
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowVector {
    pub dx: f32,
    pub dy: f32,
}

impl FlowVector {
    pub fn new(dx: f32, dy: f32) -> Self {
        Self { dx, dy }
    }

    pub fn magnitude(&self) -> f32 {
        (self.dx * self.dx + self.dy * self.dy).sqrt()
    }
}

/// 目标边界框 (left, top, right, bottom)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
}

impl BoundingBox {
    /// 创建边界框, 角点顺序不合法时返回错误
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Result<Self> {
        if left > right || top > bottom {
            return Err(CsmError::InvalidBoundingBox {
                left,
                top,
                right,
                bottom,
            });
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// 由左上角 + 宽高创建 (跟踪器常用格式)
    pub fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Result<Self> {
        Self::new(x, y, x + width, y + height)
    }

    pub fn left(&self) -> i32 {
        self.left
    }

    pub fn top(&self) -> i32 {
        self.top
    }

    pub fn right(&self) -> i32 {
        self.right
    }

    pub fn bottom(&self) -> i32 {
        self.bottom
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn top_left(&self) -> (i32, i32) {
        (self.left, self.top)
    }

    pub fn bottom_right(&self) -> (i32, i32) {
        (self.right, self.bottom)
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) as f32 / 2.0,
            (self.top + self.bottom) as f32 / 2.0,
        )
    }

    /// 从本框中心指向另一框中心的向量
    pub fn vector_to(&self, other: &BoundingBox) -> FlowVector {
        let (x0, y0) = self.center();
        let (x1, y1) = other.center();
        FlowVector::new(x1 - x0, y1 - y0)
    }

    /// 平移后的新框
    pub fn translated(&self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            right: self.right + dx,
            bottom: self.bottom + dy,
        }
    }

    /// 线格式 `left;top;right;bottom`
    pub fn to_wire(&self) -> String {
        format!("{};{};{};{}", self.left, self.top, self.right, self.bottom)
    }
}
