//! 交接队列 (Handoff queue)
//!
//! 所有跨线程通信的唯一原语: 基于crossbeam有界通道, 默认容量为1.
//! 同时持有发送端和接收端, 因此队列本身永远不会断开.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use crate::error::{CsmError, Result};

pub struct HandoffQueue<T> {
    name: &'static str,
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Clone for HandoffQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T> HandoffQueue<T> {
    /// 单槽队列
    pub fn new(name: &'static str) -> Self {
        Self::with_capacity(name, 1)
    }

    fn with_capacity(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { name, tx, rx }
    }

    /// 阻塞放入, 直到槽位空出
    pub fn put(&self, item: T) {
        // 本结构同时持有接收端, send不会因断开而失败
        let _ = self.tx.send(item);
    }

    /// 限时放入, 超时则丢弃该元素
    pub fn put_timeout(&self, item: T, timeout: Duration) -> Result<()> {
        match self.tx.send_timeout(item, timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(CsmError::QueueTimeout {
                queue: self.name,
                waited: timeout,
            }),
            Err(SendTimeoutError::Disconnected(_)) => Err(CsmError::Disconnected(self.name)),
        }
    }

    /// 非阻塞放入, 槽位已满时原样返回元素
    pub fn try_put(&self, item: T) -> std::result::Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => Err(item),
        }
    }

    pub fn take_timeout(&self, timeout: Duration) -> Result<T> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => CsmError::QueueTimeout {
                queue: self.name,
                waited: timeout,
            },
            RecvTimeoutError::Disconnected => CsmError::Disconnected(self.name),
        })
    }

    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// 用于 `crossbeam_channel::Select` 等待就绪
    pub fn receiver(&self) -> &Receiver<T> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_single_slot() {
        let q = HandoffQueue::new("test");
        assert!(q.is_empty());
        q.put(1);
        assert!(!q.is_empty());
        assert_eq!(q.try_put(2), Err(2));
        assert_eq!(q.try_take(), Some(1));
        assert!(q.try_take().is_none());
    }

    #[test]
    fn test_put_timeout_reports_backpressure() {
        let q = HandoffQueue::new("slot");
        q.put("first");
        let start = Instant::now();
        let err = q.put_timeout("second", Duration::from_millis(20)).unwrap_err();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert!(matches!(err, CsmError::QueueTimeout { queue: "slot", .. }));
        // 原有元素未被覆盖
        assert_eq!(q.try_take(), Some("first"));
    }

    #[test]
    fn test_take_timeout_on_empty() {
        let q: HandoffQueue<u8> = HandoffQueue::new("empty");
        assert!(matches!(
            q.take_timeout(Duration::from_millis(5)),
            Err(CsmError::QueueTimeout { .. })
        ));
    }

    #[test]
    fn test_blocking_put_waits_for_consumer() {
        let q = HandoffQueue::new("handoff");
        q.put(1u32);
        let producer = {
            let q = q.clone();
            std::thread::spawn(move || q.put(2))
        };
        std::thread::sleep(Duration::from_millis(30));
        assert!(!producer.is_finished());
        let wait = Duration::from_secs(1);
        assert_eq!(q.take_timeout(wait).unwrap(), 1);
        producer.join().unwrap();
        assert_eq!(q.take_timeout(wait).unwrap(), 2);
    }
}
