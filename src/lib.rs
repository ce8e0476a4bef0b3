// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod channel; // 单槽位交接队列
pub mod command; // 远端命令解析
pub mod comms; // 远端通信线程
pub mod config; // 系统配置参数
pub mod controller; // 主控制循环 (状态机)
pub mod detection; // 目标检测与跟踪
pub mod error; // 错误类型
pub mod geometry; // 目标框与光流
pub mod input; // 视频输入系统
pub mod motor; // 云台电机
pub mod storage; // 视频存储线程

pub use crate::command::Command;
pub use crate::comms::{MessageRelay, RelayLog};
pub use crate::config::{Args, CsmConfig};
pub use crate::controller::{Controller, ControllerReport};
pub use crate::detection::{Perception, StaticDetector, TemplateTracker};
pub use crate::error::{CsmError, Result, SystemState};
pub use crate::geometry::{BoundingBox, FlowVector};
pub use crate::input::{open_source, Frame, FrameSource};
pub use crate::motor::{MotionActuator, Orientation};
pub use crate::storage::{sink_for, CompileReport, StorageHandle, StorageSink};

/// 本地时间戳字符串, 各字段以 `delimiter` 分隔 (用于会话输出目录名)
pub fn gen_time_string(delimiter: &str) -> String {
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    chrono::Local::now().format(&fmt).to_string()
}
