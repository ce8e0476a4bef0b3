//! 系统配置 - 通过JSON文件调整参数, 命令行参数可覆盖单项

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::detection::Detection;

/// 图像源类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    LiveCamera,
    FileVideo,
    StillImage,
}

impl SourceKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "camera" | "live" | "live_camera" => Some(SourceKind::LiveCamera),
            "video" | "file" | "file_video" => Some(SourceKind::FileVideo),
            "image" | "still" | "still_image" => Some(SourceKind::StillImage),
            _ => None,
        }
    }
}

/// 存储输出方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    ImageSequence,
    Discard,
}

/// 非法状态转换的处理策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    LogAndContinue,
    Abort,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub path: Option<PathBuf>, // 视频帧目录 / 静态图片路径
    pub width: u32,
    pub height: u32,
    pub capture_timeout_ms: u64, // 实时相机取帧超时
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::FileVideo,
            path: None,
            width: 1280,
            height: 720,
            capture_timeout_ms: 2_000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionConfig {
    pub confidence_threshold: f32, // 检测置信度阈值
    pub tracked_class: u32,        // 重置跟踪器时查找的类别 (1 = 人)
    pub reset_tracker_freq: u32,   // 每N帧用检测结果重置跟踪器
    pub search_margin: i32,        // 模板跟踪搜索窗口外扩像素
    pub static_detections: Vec<Detection>, // 台架检测器固定输出
}

impl Default for PerceptionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            tracked_class: 1,
            reset_tracker_freq: 40,
            search_margin: 32,
            static_detections: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub handoff_timeout_ms: u64, // 有界放入等待上限
    pub poll_interval_ms: u64,   // 空闲时等待就绪的间隔
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            handoff_timeout_ms: 10_000,
            poll_interval_ms: 5,
        }
    }
}

impl CommsConfig {
    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_millis(self.handoff_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub frame_rate: u32,
    pub sink: SinkKind,
    pub annotate_frames: bool, // 在存储帧上绘制跟踪框
}

impl Default for StorageConfig {
    fn default() -> Self {
        let output_dir = dirs::video_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("inframe");
        Self {
            output_dir,
            frame_rate: 30,
            sink: SinkKind::ImageSequence,
            annotate_frames: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    pub gain_turn: f32, // 水平增益
    pub gain_tilt: f32, // 垂直增益
    pub deadband: f32,  // 小于该幅度的光流忽略
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            gain_turn: 1.0,
            gain_tilt: 1.0,
            deadband: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub auto_select_class: Option<u32>, // Start后自动选择的类别, None则只回传候选
    pub on_invalid_transition: TransitionPolicy,
    pub max_failed_resets: u32, // 连续重检测失败上限, 0表示不放弃
    pub idle_poll_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            auto_select_class: Some(1),
            on_invalid_transition: TransitionPolicy::LogAndContinue,
            max_failed_resets: 30,
            idle_poll_ms: 20,
        }
    }
}

impl ControllerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// 完整系统配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CsmConfig {
    pub source: SourceConfig,
    pub perception: PerceptionConfig,
    pub comms: CommsConfig,
    pub storage: StorageConfig,
    pub motor: MotorConfig,
    pub controller: ControllerConfig,
}

impl CsmConfig {
    /// 从JSON文件加载配置
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    warn!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => warn!("❌ 序列化配置失败: {}", e),
        }
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前系统配置:");
        info!("  图像源: {:?} {:?}", self.source.kind, self.source.path);
        info!(
            "  检测置信度: {:.2} | 跟踪类别: {}",
            self.perception.confidence_threshold, self.perception.tracked_class
        );
        info!("  跟踪器重置间隔: {} 帧", self.perception.reset_tracker_freq);
        info!("  队列超时: {} ms", self.comms.handoff_timeout_ms);
        info!(
            "  输出目录: {} @ {}fps",
            self.storage.output_dir.display(),
            self.storage.frame_rate
        );
    }
}

/// 相机系统管理器命令行参数
#[derive(Parser, Debug)]
#[command(author, version, about = "InFrame 相机系统管理器", long_about = None)]
pub struct Args {
    /// 配置文件路径
    #[arg(short, long, default_value = "csm.json")]
    pub config: PathBuf,

    /// 图像源: camera / video / image
    #[arg(short, long)]
    pub source: Option<String>,

    /// 视频帧目录或图片路径
    #[arg(short, long)]
    pub path: Option<PathBuf>,

    /// 视频输出目录
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// 跟踪器重置间隔 (帧)
    #[arg(long)]
    pub reset_freq: Option<u32>,

    /// 检测置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// 只记录不写出视频帧
    #[arg(long)]
    pub dry_run: bool,

    /// 日志级别 (RUST_LOG优先)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// 将命令行覆盖项写入配置
    pub fn apply(&self, config: &mut CsmConfig) {
        if let Some(name) = &self.source {
            match SourceKind::from_name(name) {
                Some(kind) => config.source.kind = kind,
                None => warn!("⚠️  未知图像源 {}, 保持 {:?}", name, config.source.kind),
            }
        }
        if let Some(path) = &self.path {
            config.source.path = Some(path.clone());
        }
        if let Some(output) = &self.output {
            config.storage.output_dir = output.clone();
        }
        if let Some(freq) = self.reset_freq {
            config.perception.reset_tracker_freq = freq;
        }
        if let Some(conf) = self.conf {
            config.perception.confidence_threshold = conf;
        }
        if self.dry_run {
            config.storage.sink = SinkKind::Discard;
        }
    }
}
