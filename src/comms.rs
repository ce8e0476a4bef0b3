//! 通信模块 (MessageRelay)
//! 职责: 远端链路 ⇄ 控制器命令队列, 每个方向最多缓存一条消息
//!
//! 线程模型:
//! - `MessageRelay`: 可克隆句柄, 供控制器与外部调用方使用
//! - `RelayWorker`:  独立工作线程, 拥有出站日志, 退出时随 join 返回
//!
//! 终止策略: 收到终止信号后, 工作线程先把入站/出站槽位中已有的消息各自处理完再退出.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Select;
use tracing::{debug, info, warn};

use crate::channel::HandoffQueue;
use crate::command::Command;
use crate::config::CommsConfig;
use crate::error::{CsmError, Result};

/// 出站状态消息前缀
pub const REJECTED_PREFIX: &str = "Rejected";

/// 通信线程退出时的记录
#[derive(Debug, Default, Clone)]
pub struct RelayLog {
    /// 标记为发往远端的消息 (按顺序)
    pub sent: Vec<String>,
    /// 因超时被丢弃的入站消息
    pub dropped: Vec<String>,
}

/// 通信句柄
#[derive(Clone)]
pub struct MessageRelay {
    inbound: HandoffQueue<String>,
    outbound: HandoffQueue<String>,
    terminate: HandoffQueue<()>,
    timeout: Duration,
}

/// 通信工作线程
pub struct RelayWorker {
    inbound: HandoffQueue<String>,
    outbound: HandoffQueue<String>,
    terminate: HandoffQueue<()>,
    commands: HandoffQueue<Command>,
    timeout: Duration,
    poll: Duration,
    log: RelayLog,
}

impl MessageRelay {
    /// 创建句柄与工作线程, `commands` 为控制器的入站命令队列
    pub fn new(commands: HandoffQueue<Command>, config: &CommsConfig) -> (Self, RelayWorker) {
        let inbound = HandoffQueue::new("remote-inbound");
        let outbound = HandoffQueue::new("remote-outbound");
        let terminate = HandoffQueue::new("relay-terminate");

        let relay = Self {
            inbound: inbound.clone(),
            outbound: outbound.clone(),
            terminate: terminate.clone(),
            timeout: config.handoff_timeout(),
        };
        let worker = RelayWorker {
            inbound,
            outbound,
            terminate,
            commands,
            timeout: config.handoff_timeout(),
            poll: config.poll_interval(),
            log: RelayLog::default(),
        };
        (relay, worker)
    }

    /// 请求向远端发送消息, 出站槽位满时阻塞 (背压)
    pub fn request_send(&self, message: impl Into<String>) {
        self.outbound.put(message.into());
    }

    /// 发送状态消息, 出站槽位持续占满超过超时则丢弃
    pub fn send_status(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.outbound
            .put_timeout(message.clone(), self.timeout)
            .map_err(|e| {
                warn!("⚠️  出站队列阻塞, 丢弃状态消息: {}", message);
                e
            })
    }

    /// 模拟从远端收到消息; 槽位持续占满超过超时则丢弃
    pub fn simulate_inbound(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.inbound
            .put_timeout(message.clone(), self.timeout)
            .map_err(|e| {
                warn!("⚠️  远端入站队列阻塞超过 {:?}, 丢弃: {}", self.timeout, message);
                e
            })
    }

    /// 通知通信线程退出; 已有终止信号待处理时返回 `TerminationSignalRejected`
    pub fn request_terminate(&self) -> Result<()> {
        self.terminate
            .try_put(())
            .map_err(|_| CsmError::TerminationSignalRejected)
    }

    /// 关闭整个系统 (模拟远端发送 Terminate)
    pub fn shutdown(&self) -> Result<()> {
        self.simulate_inbound(Command::Terminate.to_wire())
    }

    pub fn has_pending_inbound(&self) -> bool {
        !self.inbound.is_empty()
    }
}

impl RelayWorker {
    pub fn spawn(self) -> std::io::Result<JoinHandle<RelayLog>> {
        thread::Builder::new()
            .name("comms".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> RelayLog {
        info!("📡 通信线程启动");

        // 终止信号只检查不取出, 重复的终止请求会被拒绝
        while self.terminate.is_empty() {
            if let Some(message) = self.inbound.try_take() {
                self.forward_to_system(message);
            } else if let Some(message) = self.outbound.try_take() {
                self.deliver(message);
            } else {
                self.wait_ready();
            }
        }

        // 处理终止前已进入槽位的消息
        while let Some(message) = self.inbound.try_take() {
            self.forward_to_system(message);
        }
        while let Some(message) = self.outbound.try_take() {
            self.deliver(message);
        }

        info!(
            "📡 通信线程退出 (发送 {} 条, 丢弃 {} 条)",
            self.log.sent.len(),
            self.log.dropped.len()
        );
        self.log
    }

    /// 阻塞直到任一槽位可读或超时, 不消费消息
    fn wait_ready(&self) {
        let mut sel = Select::new();
        sel.recv(self.inbound.receiver());
        sel.recv(self.outbound.receiver());
        sel.recv(self.terminate.receiver());
        let _ = sel.ready_timeout(self.poll);
    }

    fn forward_to_system(&mut self, message: String) {
        let command = match message.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                warn!("⚠️  拒绝远端消息: {}", e);
                self.deliver(format!("{};{}", REJECTED_PREFIX, e));
                return;
            }
        };

        debug!("📥 转发命令: {}", command.name());
        if let Err(e) = self.commands.put_timeout(command, self.timeout) {
            warn!("⚠️  命令队列阻塞, 丢弃 {}: {}", message, e);
            self.log.dropped.push(message);
        }
    }

    fn deliver(&mut self, message: String) {
        info!("📤 发送到远端: {}", message);
        self.log.sent.push(message);
    }
}
