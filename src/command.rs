//! 远程命令解析
//! Remote command wire format
//!
//! 入站负载为UTF-8字符串: `Terminate` / `Finish` / `Start` / `left;top;right;bottom`

use std::str::FromStr;

use crate::error::CsmError;
use crate::geometry::BoundingBox;

/// 入站负载最大长度
pub const MAX_PAYLOAD_LEN: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 关闭整个系统
    Terminate,
    /// 停止拍摄, 合成视频, 重启存储
    Finish,
    /// 请求候选目标 (执行一次检测并回传)
    Start,
    /// 用户选择的目标框
    SelectTarget(BoundingBox),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Terminate => "Terminate",
            Command::Finish => "Finish",
            Command::Start => "Start",
            Command::SelectTarget(_) => "SelectTarget",
        }
    }

    /// 编码为线格式
    pub fn to_wire(&self) -> String {
        match self {
            Command::SelectTarget(bbox) => bbox.to_wire(),
            other => other.name().to_string(),
        }
    }
}

impl FromStr for Command {
    type Err = CsmError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| CsmError::MalformedCommand {
            payload: payload.chars().take(64).collect(),
            reason: reason.to_string(),
        };

        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(malformed("payload too long"));
        }

        let trimmed = payload.trim();
        match trimmed {
            "Terminate" => return Ok(Command::Terminate),
            "Finish" => return Ok(Command::Finish),
            "Start" => return Ok(Command::Start),
            _ => {}
        }

        let parts: Vec<&str> = trimmed.split(';').collect();
        if parts.len() != 4 {
            return Err(malformed("expected keyword or left;top;right;bottom"));
        }

        let mut coords = [0i32; 4];
        for (slot, part) in coords.iter_mut().zip(&parts) {
            *slot = part
                .trim()
                .parse::<i32>()
                .map_err(|_| malformed("coordinate is not a decimal integer"))?;
        }

        let bbox = BoundingBox::new(coords[0], coords[1], coords[2], coords[3])
            .map_err(|e| malformed(&e.to_string()))?;
        Ok(Command::SelectTarget(bbox))
    }
}
