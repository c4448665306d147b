//! 视觉帧处理器
//!
//! 每帧：人数检测 → 姿态判定 → 与上一帧做帧差 → 发布 VisionStatus。
//! 帧来源是摄像头线程或上传的图像，经有界队列交给处理循环。

use super::config::VisionConfig;
use super::detector::{pose_risk, VisionDetector};
use super::frame::{motion_score, Frame};
use crate::audio::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use crate::capture::{CaptureStream, FrameSource, Worker};
use crate::clock::Clock;
use crate::error::{SentinelError, SentinelResult};
use crate::status::{StatusStore, VisionStatus};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

/// 视觉处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisionStats {
    /// 已发布状态的帧数
    pub frames_processed: u64,
    /// 检测失败被跳过的帧数
    pub frames_skipped: u64,
    /// 无法解码的上传数
    pub decode_failures: u64,
    /// 队列溢出丢弃的帧数
    pub frames_dropped: u64,
    /// 当前排队的帧数
    pub queued_frames: usize,
    /// 摄像头采集线程在运行
    pub device_active: bool,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    skipped: AtomicU64,
    decode_failures: AtomicU64,
}

struct VisionShared {
    config: VisionConfig,
    detector: Arc<dyn VisionDetector>,
    store: Arc<StatusStore>,
    clock: Arc<dyn Clock>,
    producer: RingProducer<Frame>,
    consumer: RingConsumer<Frame>,
    /// 帧差参考帧，只在处理路径上读改写
    previous: Mutex<Option<Frame>>,
    counters: Counters,
}

impl VisionShared {
    fn detect(&self, frame: &Frame) -> SentinelResult<(u32, bool)> {
        let people = self.detector.detect_people(frame)?;

        let pose = match self.detector.detect_pose(frame) {
            Ok(Some(poses)) => pose_risk(&poses),
            Ok(None) => false,
            Err(SentinelError::CapabilityUnavailable(reason)) => {
                tracing::debug!("姿态检测不可用: {}", reason);
                false
            }
            Err(e) => return Err(e),
        };

        Ok((u32::try_from(people).unwrap_or(u32::MAX), pose))
    }

    fn process(&self, frame: &Frame) -> SentinelResult<VisionStatus> {
        let (people_count, pose_risk) = match self.detect(frame) {
            Ok(result) => result,
            Err(e) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("⚠️ 视觉检测失败，跳过该帧: {}", e);
                return Err(e);
            }
        };

        let motion_detected = {
            let mut previous = self.previous.lock();
            let motion = previous
                .as_ref()
                .and_then(|prev| motion_score(prev, frame))
                .map(|score| score > self.config.motion_threshold)
                .unwrap_or(false);
            *previous = Some(frame.clone());
            motion
        };

        let status = VisionStatus {
            people_count,
            pose_risk,
            motion_detected,
            active: true,
            timestamp: Some(self.clock.now()),
        };
        self.store.set_vision_status(status.clone());
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(
            "发布视觉状态: {} 人, 姿态风险 {}, 运动 {}",
            people_count,
            pose_risk,
            motion_detected
        );
        Ok(status)
    }

    fn process_pending(&self) -> usize {
        // 只处理本轮开始时已排队的帧
        self.consumer
            .drain_all()
            .iter()
            .filter(|frame| self.process(frame).is_ok())
            .count()
    }
}

/// 视觉帧处理器
pub struct VisionFrameProcessor {
    shared: Arc<VisionShared>,
    worker: Worker,
    capture: Mutex<Option<CaptureStream>>,
}

impl VisionFrameProcessor {
    pub fn new(
        config: VisionConfig,
        detector: Arc<dyn VisionDetector>,
        store: Arc<StatusStore>,
        clock: Arc<dyn Clock>,
    ) -> SentinelResult<Self> {
        config.validate()?;

        let (producer, consumer) = RingBuffer::new(config.frame_queue_capacity).split();
        tracing::info!(
            "创建视觉处理器: 运动阈值 {}, 帧队列 {}",
            config.motion_threshold,
            config.frame_queue_capacity
        );

        Ok(Self {
            shared: Arc::new(VisionShared {
                config,
                detector,
                store,
                clock,
                producer,
                consumer,
                previous: Mutex::new(None),
                counters: Counters::default(),
            }),
            worker: Worker::new(),
            capture: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &VisionConfig {
        &self.shared.config
    }

    /// 同步处理一帧并发布状态
    ///
    /// 检测失败时返回错误，状态与参考帧保持不变。
    pub fn process(&self, frame: &Frame) -> SentinelResult<VisionStatus> {
        self.shared.process(frame)
    }

    /// 解码上传的图像并排入处理队列
    pub fn ingest(&self, bytes: &[u8]) -> SentinelResult<()> {
        let frame = Frame::decode(bytes).map_err(|e| {
            self.shared.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("⚠️ 图像解码失败: {}", e);
            e
        })?;
        self.enqueue(frame);
        Ok(())
    }

    /// 排入已解码的帧（队列满时丢弃最旧帧）
    pub fn enqueue(&self, frame: Frame) {
        self.shared.producer.push(frame);
    }

    /// 处理队列中的所有帧，返回成功处理的帧数
    pub fn process_pending(&self) -> usize {
        self.shared.process_pending()
    }

    /// 启动处理循环，可选地同时打开摄像头
    pub fn start(&self, device: Option<FrameSource>) -> SentinelResult<bool> {
        let mut capture = self.capture.lock();
        if self.worker.is_running() {
            tracing::warn!("视觉处理器已在运行");
            return Ok(false);
        }

        if let Some(source) = device {
            let producer = self.shared.producer.clone();
            let stream = CaptureStream::start(source, move |frame: Frame| {
                producer.push(frame);
            })
            .map_err(|e| match e {
                SentinelError::DeviceUnavailable(_) => e,
                other => SentinelError::DeviceUnavailable(other.to_string()),
            })?;
            *capture = Some(stream);
        }

        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_millis(self.shared.config.poll_interval_ms);
        if let Err(e) = self.worker.start("vision-processor", interval, move || {
            shared.process_pending();
        }) {
            if let Some(mut stream) = capture.take() {
                stream.stop();
            }
            return Err(e);
        }

        Ok(true)
    }

    /// 停止处理循环并释放摄像头；可重复调用
    pub fn stop(&self) {
        let mut capture = self.capture.lock();
        if let Some(mut stream) = capture.take() {
            stream.stop();
        }
        if self.worker.is_running() {
            self.worker.stop();
            tracing::info!("视觉处理器已停止");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub fn stats(&self) -> VisionStats {
        let c = &self.shared.counters;
        VisionStats {
            frames_processed: c.processed.load(Ordering::Relaxed),
            frames_skipped: c.skipped.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            frames_dropped: self.shared.consumer.dropped_count(),
            queued_frames: self.shared.consumer.available(),
            device_active: self
                .capture
                .lock()
                .as_ref()
                .is_some_and(CaptureStream::is_running),
        }
    }
}

impl Drop for VisionFrameProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}
