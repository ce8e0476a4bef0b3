/// 相机系统管理器 (Camera System Manager)
///
/// 系统架构:
/// 1. 控制线程: 主状态机 (检测 → 选择 → 跟踪 → 重置)
/// 2. 通信线程: 远端消息收发
/// 3. 存储线程: 每个拍摄会话一个, 会话结束时写出
/// 4. 主线程:   操作台, 标准输入的每一行作为远端消息注入
use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use image::{Rgb, RgbImage};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inframe_csm::config::SourceConfig;
use inframe_csm::input::{CameraFeed, FileVideo};
use inframe_csm::{
    open_source, sink_for, Args, Command, Controller, CsmConfig, FrameSource, Perception,
    StaticDetector, TemplateTracker,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// 模板跟踪最大归一化误差
const TRACKER_MAX_ERROR: f32 = 0.25;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🚀 InFrame 相机系统启动");

    let mut config = CsmConfig::load(&args.config);
    args.apply(&mut config);
    config.log_summary();

    // ========== 图像源 ==========
    let (source, feed) = open_source(&config.source).context("打开图像源失败")?;
    if let Some(feed) = feed {
        spawn_camera_feed(feed, &config.source, config.storage.frame_rate)?;
    }

    // ========== 感知 ==========
    let perception = Perception::new(
        Box::new(StaticDetector::new(config.perception.static_detections.clone())),
        Box::new(TemplateTracker::new(
            config.perception.search_margin,
            TRACKER_MAX_ERROR,
        )),
        &config.perception,
    );

    // ========== 控制线程 ==========
    let sink = sink_for(config.storage.sink);
    let (controller, relay) =
        Controller::new(config, source, perception, sink).context("启动系统管理器失败")?;
    let handle = thread::Builder::new()
        .name("controller".to_string())
        .spawn(move || controller.run())
        .context("启动控制线程失败")?;

    // ========== 操作台 ==========
    info!("⌨️  输入远端消息: Start | left;top;right;bottom | Finish | Terminate");
    let terminate = Command::Terminate.to_wire();
    let mut terminated = false;
    for line in std::io::stdin().lock().lines() {
        let line = line.context("读取标准输入失败")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if handle.is_finished() {
            warn!("⚠️  控制线程已退出");
            break;
        }
        if let Err(e) = relay.simulate_inbound(line) {
            warn!("⚠️  消息未送达: {}", e);
        }
        if line == terminate {
            terminated = true;
            break;
        }
    }
    if !terminated && !handle.is_finished() {
        info!("标准输入结束, 发送终止命令");
        relay.shutdown().context("发送终止命令失败")?;
    }

    let report = handle
        .join()
        .map_err(|_| anyhow!("控制线程异常退出"))?
        .context("系统管理器出错")?;

    info!("📊 运行汇总:");
    info!(
        "  朝向: turn={:.1} tilt={:.1}",
        report.orientation.turn, report.orientation.tilt
    );
    info!("  跟踪步数: {}", report.tracking_steps);
    info!("  拒绝命令: {}", report.rejected_commands);
    if report.failed_compiles > 0 {
        warn!("  写出失败会话: {}", report.failed_compiles);
    }
    for compiled in &report.compiled {
        if let Some(path) = &compiled.output_path {
            info!(
                "  💾 {} ({} 帧, {}x{})",
                path.display(),
                compiled.frame_count,
                compiled.width,
                compiled.height
            );
        }
    }
    info!("📤 出站消息 {} 条:", report.relay_log.sent.len());
    for message in &report.relay_log.sent {
        info!("  {}", message);
    }
    Ok(())
}

/// 实时相机采集线程
///
/// 配置了帧目录时按帧率回放, 否则推送纯色帧
fn spawn_camera_feed(feed: CameraFeed, config: &SourceConfig, frame_rate: u32) -> anyhow::Result<()> {
    let interval = Duration::from_secs_f64(1.0 / frame_rate.max(1) as f64);
    let mut replay = match &config.path {
        Some(dir) => Some(FileVideo::open(dir.clone()).context("打开回放目录失败")?),
        None => {
            warn!("⚠️  未配置采集目录, 推送空白帧");
            None
        }
    };
    let (width, height) = (config.width, config.height);

    thread::Builder::new()
        .name("camera".to_string())
        .spawn(move || {
            let mut dropped = 0u64;
            loop {
                let image = match replay.as_mut() {
                    Some(video) => match video.capture() {
                        Ok(frame) => frame.into_image(),
                        Err(_) => break,
                    },
                    None => RgbImage::from_pixel(width, height, Rgb([32, 32, 32])),
                };
                if !feed.push(image) {
                    dropped += 1;
                }
                thread::sleep(interval);
            }
            info!("📷 采集结束 (丢弃 {} 帧)", dropped);
        })
        .context("启动采集线程失败")?;
    Ok(())
}
