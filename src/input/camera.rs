//! 实时相机输入
//!
//! 采集线程(驱动/解码器)将帧推入有界通道, 控制器按需拉取.
//! 通道满时丢弃新帧, 保证控制器总是拿到最近的画面.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use image::RgbImage;
use tracing::{debug, info};

use super::{Frame, FrameSource};
use crate::error::{CsmError, Result};

/// 采集端 (驱动线程持有)
#[derive(Clone)]
pub struct CameraFeed {
    tx: Sender<RgbImage>,
}

impl CameraFeed {
    /// 推送一帧, 通道已满时丢弃并返回false
    pub fn push(&self, image: RgbImage) -> bool {
        self.tx.try_send(image).is_ok()
    }
}

pub struct LiveCamera {
    rx: Option<Receiver<RgbImage>>,
    timeout: Duration,
    next_index: u64,
    timeouts: u64,
}

impl LiveCamera {
    /// 创建相机与其采集端
    pub fn channel(capacity: usize, timeout: Duration) -> (CameraFeed, Self) {
        let (tx, rx) = bounded(capacity);
        let camera = Self {
            rx: Some(rx),
            timeout,
            next_index: 0,
            timeouts: 0,
        };
        (CameraFeed { tx }, camera)
    }
}

impl FrameSource for LiveCamera {
    fn capture(&mut self) -> Result<Frame> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| CsmError::SourceExhausted("camera released".to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(image) => {
                let frame = Frame::new(self.next_index, image);
                self.next_index += 1;
                if self.next_index % 300 == 0 {
                    debug!("📷 相机已采集 {} 帧", self.next_index);
                }
                Ok(frame)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.timeouts += 1;
                Err(CsmError::SourceExhausted(format!(
                    "no camera frame within {:?}",
                    self.timeout
                )))
            }
            Err(RecvTimeoutError::Disconnected) => Err(CsmError::SourceExhausted(
                "camera feed disconnected".to_string(),
            )),
        }
    }

    fn release(&mut self) {
        if self.rx.take().is_some() {
            info!("📷 相机已释放 (共 {} 帧, 超时 {} 次)", self.next_index, self.timeouts);
        }
    }

    fn name(&self) -> &str {
        "live-camera"
    }
}
