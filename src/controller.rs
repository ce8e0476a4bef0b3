//! 系统管理器 (SystemMan)
//!
//! 主控制循环, 状态机:
//!
//! | 当前    | 事件           | 动作                             | 下一状态 |
//! |---------|----------------|----------------------------------|----------|
//! | Idle    | Start          | 检测候选目标, 回传远端, 可自动选择 | Idle     |
//! | Idle    | SelectTarget   | 取帧, 初始化跟踪器                | Filming  |
//! | Filming | Finish         | 写出会话, 启动新存储线程           | Idle     |
//! | any     | Terminate      | 退出主循环                        | -        |
//! | Filming | (无命令)       | 一步跟踪                          | Filming  |
//!
//! 其他组合返回 `InvalidTransition`, 由 `TransitionPolicy` 决定记录后继续或中止.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use image::Rgb;
use tracing::{debug, error, info, warn};

use crate::channel::HandoffQueue;
use crate::command::Command;
use crate::comms::{MessageRelay, RelayLog, REJECTED_PREFIX};
use crate::config::{CsmConfig, TransitionPolicy};
use crate::detection::{find_class_in_detections, Perception, TrackOutcome};
use crate::error::{CsmError, Result, SystemState};
use crate::geometry::BoundingBox;
use crate::input::{Frame, FrameSource};
use crate::motor::{MotionActuator, Orientation};
use crate::storage::{CompileReport, StorageHandle, StorageSink};

/// 候选目标消息前缀
pub const PROPOSAL_PREFIX: &str = "Proposal";
/// 会话写出完成消息前缀
pub const COMPILED_PREFIX: &str = "Compiled";
/// 会话写出失败消息前缀
pub const FAILED_PREFIX: &str = "Failed";

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// 当前跟踪会话
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSession {
    pub current_box: BoundingBox,
    pub frames_since_reset: u32,
    pub failed_resets: u32,
}

impl TrackingSession {
    fn new(current_box: BoundingBox) -> Self {
        Self {
            current_box,
            frames_since_reset: 0,
            failed_resets: 0,
        }
    }
}

enum LoopControl {
    Continue,
    Break,
}

/// 主循环退出后的汇总
#[derive(Debug)]
pub struct ControllerReport {
    pub orientation: Orientation,
    /// 写出了帧的会话 (零帧会话不计入)
    pub compiled: Vec<CompileReport>,
    /// 输出端写出失败的会话数
    pub failed_compiles: usize,
    pub tracking_steps: u64,
    pub rejected_commands: usize,
    pub relay_log: RelayLog,
    /// 关闭时仍留在命令队列中的命令
    pub discarded_commands: Vec<Command>,
}

pub struct Controller {
    config: CsmConfig,
    source: Box<dyn FrameSource>,
    perception: Perception,
    actuator: MotionActuator,

    commands: HandoffQueue<Command>,
    relay: MessageRelay,
    relay_thread: Option<JoinHandle<RelayLog>>,

    sink: Arc<dyn StorageSink>,
    storage: Option<StorageHandle>,

    state: SystemState,
    session: Option<TrackingSession>,
    session_counter: u64,
    tracking_steps: u64,
    compiled: Vec<CompileReport>,
    failed_compiles: usize,
    rejected_commands: usize,
}

impl Controller {
    /// 创建控制器并启动通信与存储线程
    ///
    /// 返回的 `MessageRelay` 句柄代表远端链路
    pub fn new(
        config: CsmConfig,
        source: Box<dyn FrameSource>,
        perception: Perception,
        sink: Arc<dyn StorageSink>,
    ) -> Result<(Self, MessageRelay)> {
        let commands = HandoffQueue::new("commands");
        let (relay, worker) = MessageRelay::new(commands.clone(), &config.comms);
        let relay_thread = worker.spawn().map_err(|source| CsmError::Spawn {
            worker: "comms",
            source,
        })?;
        let storage = StorageHandle::spawn(sink.clone())?;

        info!(
            "🚀 系统管理器就绪: 图像源={} 输出端={}",
            source.name(),
            sink.name()
        );

        let controller = Self {
            actuator: MotionActuator::new(&config.motor),
            config,
            source,
            perception,
            commands,
            relay: relay.clone(),
            relay_thread: Some(relay_thread),
            sink,
            storage: Some(storage),
            state: SystemState::Idle,
            session: None,
            session_counter: 0,
            tracking_steps: 0,
            compiled: Vec::new(),
            failed_compiles: 0,
            rejected_commands: 0,
        };
        Ok((controller, relay))
    }

    pub fn state(&self) -> SystemState {
        self.state
    }

    pub fn session(&self) -> Option<&TrackingSession> {
        self.session.as_ref()
    }

    /// 运行主循环直到收到 Terminate, 然后关闭所有线程
    ///
    /// 中止策略下的非法状态转换在完成关闭后以错误返回
    pub fn run(mut self) -> Result<ControllerReport> {
        info!("▶️  主循环启动");
        let outcome = self.main_loop();
        let report = self.shutdown()?;
        outcome.map(|()| report)
    }

    fn main_loop(&mut self) -> Result<()> {
        loop {
            let next = match self.state {
                SystemState::Idle => self
                    .commands
                    .take_timeout(self.config.controller.idle_poll())
                    .ok(),
                SystemState::Filming => self.commands.try_take(),
            };

            if let Some(command) = next {
                match self.handle_command(command) {
                    Ok(LoopControl::Continue) => {}
                    Ok(LoopControl::Break) => return Ok(()),
                    Err(e @ CsmError::InvalidTransition { .. }) => {
                        match self.config.controller.on_invalid_transition {
                            TransitionPolicy::LogAndContinue => self.reject(&e),
                            TransitionPolicy::Abort => {
                                error!("❌ 非法状态转换, 中止: {}", e);
                                return Err(e);
                            }
                        }
                    }
                    Err(e) => self.reject(&e),
                }
                continue;
            }

            if self.state == SystemState::Filming {
                match self.tracking_step() {
                    Ok(()) => {}
                    Err(CsmError::SourceExhausted(reason)) => {
                        warn!("⚠️  图像源耗尽, 结束会话: {}", reason);
                        if let Err(e) = self.end_session() {
                            error!("❌ 结束会话失败: {}", e);
                        }
                    }
                    Err(e) => warn!("⚠️  跟踪步骤失败: {}", e),
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> Result<LoopControl> {
        debug!("📨 [{}] 收到命令 {}", self.state, command.name());
        match command {
            Command::Terminate => {
                info!("🛑 收到终止命令");
                Ok(LoopControl::Break)
            }
            Command::Start => {
                self.expect_state(&command, SystemState::Idle)?;
                self.propose_targets()?;
                Ok(LoopControl::Continue)
            }
            Command::SelectTarget(bbox) => {
                self.expect_state(&command, SystemState::Idle)?;
                self.select_target(bbox)?;
                Ok(LoopControl::Continue)
            }
            Command::Finish => {
                self.expect_state(&command, SystemState::Filming)?;
                self.end_session()?;
                Ok(LoopControl::Continue)
            }
        }
    }

    fn expect_state(&self, command: &Command, expected: SystemState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CsmError::InvalidTransition {
                command: command.name(),
                current: self.state,
                expected,
            })
        }
    }

    fn reject(&mut self, e: &CsmError) {
        warn!("⚠️  拒绝命令: {}", e);
        self.rejected_commands += 1;
        let _ = self.relay.send_status(format!("{};{}", REJECTED_PREFIX, e));
    }

    /// 检测候选目标并回传远端
    fn propose_targets(&mut self) -> Result<()> {
        let frame = self.source.capture()?;
        let detections = self.perception.detect_objects(&frame)?;
        info!("🔍 候选目标 {} 个", detections.len());

        let json = serde_json::to_string(&detections)?;
        let _ = self
            .relay
            .send_status(format!("{};{}", PROPOSAL_PREFIX, json));

        if let Some(class_id) = self.config.controller.auto_select_class {
            match find_class_in_detections(&detections, class_id) {
                Some(bbox) => {
                    info!("🎯 自动选择类别 {}: {}", class_id, bbox.to_wire());
                    let _ = self.relay.simulate_inbound(bbox.to_wire());
                }
                None => debug!("未找到可自动选择的类别 {}", class_id),
            }
        }
        Ok(())
    }

    fn select_target(&mut self, bbox: BoundingBox) -> Result<()> {
        let frame = self.source.capture()?;
        if let Err(e) = self.perception.init_tracker(&frame, bbox) {
            // 不致命: 下一步跟踪失败后走重检测
            warn!("⚠️  {}", e);
        }
        self.session = Some(TrackingSession::new(bbox));
        self.state = SystemState::Filming;
        info!("🎬 开始拍摄, 目标 {}", bbox.to_wire());
        Ok(())
    }

    /// 一步跟踪: 取帧 → 更新或重置 → 电机 → 存储
    fn tracking_step(&mut self) -> Result<()> {
        let mut frame = self.source.capture()?;
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        self.tracking_steps += 1;

        let freq = self.perception.reset_tracker_freq();
        if freq > 0 && session.frames_since_reset == freq {
            self.redetect(&frame, &mut session);
            session.frames_since_reset = 0;
        } else {
            match self.perception.track_object_in_new_frame(&frame) {
                TrackOutcome::Tracked { bbox, flow } => {
                    session.current_box = bbox;
                    self.actuator.adjust_orientation(flow);
                }
                TrackOutcome::Lost => {
                    debug!("[帧{}] 跟踪丢失", frame.index());
                    self.redetect(&frame, &mut session);
                }
            }
            session.frames_since_reset += 1;
        }

        if self.config.storage.annotate_frames {
            frame.draw_box(&session.current_box, BOX_COLOR);
        }
        if let Some(storage) = &self.storage {
            storage.append(frame);
        }

        let limit = self.config.controller.max_failed_resets;
        if limit > 0 && session.failed_resets >= limit {
            warn!("⚠️  连续 {} 次重检测未找到目标, 放弃跟踪", session.failed_resets);
            self.end_session()?;
        } else {
            self.session = Some(session);
        }
        Ok(())
    }

    fn redetect(&mut self, frame: &Frame, session: &mut TrackingSession) {
        let class_id = self.config.perception.tracked_class;
        match self.perception.reset_tracker(frame, class_id) {
            Ok(Some(bbox)) => {
                session.current_box = bbox;
                session.failed_resets = 0;
            }
            Ok(None) => session.failed_resets += 1,
            Err(e) => {
                warn!("⚠️  重检测失败: {}", e);
                session.failed_resets += 1;
            }
        }
    }

    /// 结束当前会话: 启动新存储线程 → 写出旧会话 → Idle
    ///
    /// 写出失败以 `Failed;` 状态回报, 不中断主循环
    fn end_session(&mut self) -> Result<()> {
        self.session = None;
        self.perception.clear();
        self.state = SystemState::Idle;

        let finished = self
            .storage
            .replace(StorageHandle::spawn(self.sink.clone())?);
        match self.compile_storage(finished) {
            Ok(Some(report)) => {
                if let Some(path) = &report.output_path {
                    let _ = self
                        .relay
                        .send_status(format!("{};{}", COMPILED_PREFIX, path.display()));
                }
                self.compiled.push(report);
            }
            Ok(None) => {}
            Err(e) => {
                self.failed_compiles += 1;
                error!("❌ 会话写出失败: {}", e);
                let _ = self.relay.send_status(format!("{};{}", FAILED_PREFIX, e));
            }
        }
        info!("⏹️  会话结束, 回到空闲");
        Ok(())
    }

    /// 写出并等待一个存储线程, 零帧会话返回 None
    fn compile_storage(&mut self, storage: Option<StorageHandle>) -> Result<Option<CompileReport>> {
        let Some(storage) = storage else {
            return Ok(None);
        };
        let output = self.next_output_path();
        let report = storage.compile(&output, self.config.storage.frame_rate)?;
        if report.output_path.is_none() {
            return Ok(None);
        }
        self.session_counter += 1;
        info!(
            "💾 会话 {} 已写出 {} 帧 → {}",
            self.session_counter,
            report.frame_count,
            output.display()
        );
        Ok(Some(report))
    }

    fn next_output_path(&self) -> PathBuf {
        self.config.storage.output_dir.join(format!(
            "video{}_{}",
            self.session_counter + 1,
            crate::gen_time_string("")
        ))
    }

    fn shutdown(&mut self) -> Result<ControllerReport> {
        info!("🔻 正在关闭...");
        self.source.release();

        if let Err(e) = self.relay.request_terminate() {
            info!("通信线程已在关闭中: {}", e);
        }
        let relay_log = match self.relay_thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CsmError::WorkerPanicked("comms"))?,
            None => RelayLog::default(),
        };

        let mut discarded_commands = Vec::new();
        while let Some(command) = self.commands.try_take() {
            warn!("⚠️  关闭时丢弃命令 {}", command.name());
            discarded_commands.push(command);
        }

        self.session = None;
        let finished = self.storage.take();
        match self.compile_storage(finished) {
            Ok(Some(report)) => self.compiled.push(report),
            Ok(None) => {}
            Err(e) => {
                self.failed_compiles += 1;
                error!("❌ 关闭时会话写出失败: {}", e);
            }
        }

        info!(
            "✅ 已关闭: 跟踪 {} 步, 写出 {} 个会话",
            self.tracking_steps,
            self.compiled.len()
        );
        Ok(ControllerReport {
            orientation: self.actuator.orientation(),
            compiled: std::mem::take(&mut self.compiled),
            failed_compiles: self.failed_compiles,
            tracking_steps: self.tracking_steps,
            rejected_commands: self.rejected_commands,
            relay_log,
            discarded_commands,
        })
    }
}
