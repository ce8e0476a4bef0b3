/// 视频存储系统 (StorageMan)
///
/// 每个拍摄会话对应一个独立存储线程:
/// - append:  控制器移交帧 (槽位满时阻塞, 已接收的帧不会丢弃)
/// - compile: 唯一的结束方式, 消费句柄 → 写出 → 线程退出
pub mod sink;

pub use sink::{sink_for, DiscardSink, ImageSequenceSink, Manifest, StorageSink};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Select;
use tracing::{debug, info};

use crate::channel::HandoffQueue;
use crate::error::{CsmError, Result};
use crate::input::Frame;

/// 写出请求
#[derive(Debug)]
struct CompileRequest {
    output: PathBuf,
    frame_rate: u32,
}

/// 一个会话的写出结果
#[derive(Debug, Clone, PartialEq)]
pub struct CompileReport {
    /// 零帧会话不调用输出端, 此时为 None
    pub output_path: Option<PathBuf>,
    pub frame_count: usize,
    pub width: u32,
    pub height: u32,
}

/// 存储线程句柄
pub struct StorageHandle {
    frames: HandoffQueue<Frame>,
    compile: HandoffQueue<CompileRequest>,
    thread: JoinHandle<Result<CompileReport>>,
}

impl StorageHandle {
    /// 启动一个新的存储线程
    pub fn spawn(sink: Arc<dyn StorageSink>) -> Result<Self> {
        let frames = HandoffQueue::new("storage-frames");
        let compile = HandoffQueue::new("storage-compile");

        let worker = StorageWorker {
            frames: frames.clone(),
            compile: compile.clone(),
            sink,
            buffered: Vec::new(),
        };
        let thread = thread::Builder::new()
            .name("storage".to_string())
            .spawn(move || worker.run())
            .map_err(|source| CsmError::Spawn {
                worker: "storage",
                source,
            })?;

        Ok(Self {
            frames,
            compile,
            thread,
        })
    }

    /// 移交一帧
    pub fn append(&self, frame: Frame) {
        self.frames.put(frame);
    }

    /// 请求写出并等待线程退出
    pub fn compile(self, output: &Path, frame_rate: u32) -> Result<CompileReport> {
        self.compile.put(CompileRequest {
            output: output.to_path_buf(),
            frame_rate,
        });
        self.thread
            .join()
            .map_err(|_| CsmError::WorkerPanicked("storage"))?
    }
}

struct StorageWorker {
    frames: HandoffQueue<Frame>,
    compile: HandoffQueue<CompileRequest>,
    sink: Arc<dyn StorageSink>,
    buffered: Vec<Frame>,
}

impl StorageWorker {
    fn run(mut self) -> Result<CompileReport> {
        debug!("💽 存储线程启动 (输出端: {})", self.sink.name());

        let request = loop {
            if let Some(frame) = self.frames.try_take() {
                self.buffered.push(frame);
                continue;
            }
            if let Some(request) = self.compile.try_take() {
                break request;
            }
            let mut sel = Select::new();
            sel.recv(self.frames.receiver());
            sel.recv(self.compile.receiver());
            sel.ready();
        };

        // 写出请求之前移交的最后一帧可能仍在槽位中
        while let Some(frame) = self.frames.try_take() {
            self.buffered.push(frame);
        }

        self.finalize(request)
    }

    fn finalize(self, request: CompileRequest) -> Result<CompileReport> {
        let frame_count = self.buffered.len();
        if frame_count == 0 {
            info!("💽 空会话, 不写出 ({})", request.output.display());
            return Ok(CompileReport {
                output_path: None,
                frame_count: 0,
                width: 0,
                height: 0,
            });
        }

        let (width, height) = (self.buffered[0].width(), self.buffered[0].height());
        let output_path = self
            .sink
            .finalize(self.buffered, &request.output, request.frame_rate)?;

        Ok(CompileReport {
            output_path: Some(output_path),
            frame_count,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;

    /// 记录每次写出收到的帧序号
    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<Vec<u64>>>,
    }

    impl StorageSink for RecordingSink {
        fn finalize(&self, frames: Vec<Frame>, output: &Path, _frame_rate: u32) -> Result<PathBuf> {
            let indices = frames.iter().map(|f| f.index()).collect();
            self.calls.lock().unwrap().push(indices);
            Ok(output.to_path_buf())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_appends_finalized_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let storage = StorageHandle::spawn(sink.clone()).unwrap();

        for i in 0..17 {
            storage.append(Frame::new(i, RgbImage::new(4, 3)));
        }
        let report = storage.compile(Path::new("out/video1"), 30).unwrap();

        assert_eq!(report.frame_count, 17);
        assert_eq!((report.width, report.height), (4, 3));
        assert_eq!(report.output_path, Some(PathBuf::from("out/video1")));

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (0..17).collect::<Vec<u64>>());
    }

    #[test]
    fn test_empty_session_skips_sink() {
        let sink = Arc::new(RecordingSink::default());
        let storage = StorageHandle::spawn(sink.clone()).unwrap();

        let report = storage.compile(Path::new("out/empty"), 30).unwrap();
        assert_eq!(report.output_path, None);
        assert_eq!(report.frame_count, 0);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fresh_worker_per_session() {
        let sink = Arc::new(RecordingSink::default());

        let first = StorageHandle::spawn(sink.clone()).unwrap();
        first.append(Frame::new(0, RgbImage::new(2, 2)));
        first.compile(Path::new("a"), 30).unwrap();

        let second = StorageHandle::spawn(sink.clone()).unwrap();
        second.append(Frame::new(5, RgbImage::new(2, 2)));
        second.append(Frame::new(6, RgbImage::new(2, 2)));
        second.compile(Path::new("b"), 30).unwrap();

        let calls = sink.calls.lock().unwrap();
        assert_eq!(*calls, vec![vec![0], vec![5, 6]]);
    }
}
