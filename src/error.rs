//! 系统错误类型
//! Error taxonomy shared by the controller and its workers

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::SourceKind;

/// 控制器状态 (用于状态不匹配错误)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemState {
    Idle,
    Filming,
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemState::Idle => write!(f, "IDLE"),
            SystemState::Filming => write!(f, "FILMING"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CsmError {
    /// 有界队列等待超时 (消息被丢弃)
    #[error("{queue} queue blocked longer than {waited:?}")]
    QueueTimeout { queue: &'static str, waited: Duration },

    /// 命令与当前状态不匹配
    #[error("command {command} received in state {current}, expected {expected}")]
    InvalidTransition {
        command: &'static str,
        current: SystemState,
        expected: SystemState,
    },

    /// 图像源配置缺少路径
    #[error("{kind:?} source requires a path")]
    MissingSourcePath { kind: SourceKind },

    #[error("frame source exhausted: {0}")]
    SourceExhausted(String),

    #[error("tracker failed to initialize on {0}")]
    TrackerInitFailure(String),

    /// 终止信号已在队列中
    #[error("termination already pending")]
    TerminationSignalRejected,

    #[error("malformed command {payload:?}: {reason}")]
    MalformedCommand { payload: String, reason: String },

    #[error("invalid bounding box ({left}, {top}, {right}, {bottom})")]
    InvalidBoundingBox {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },

    /// 队列另一端已关闭
    #[error("{0} queue disconnected")]
    Disconnected(&'static str),

    #[error("{0} worker panicked")]
    WorkerPanicked(&'static str),

    #[error("failed to spawn {worker} thread")]
    Spawn {
        worker: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CsmError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CsmError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CsmError>;
