//! 音频流处理器
//!
//! 采集端把样本写入有界队列（永不阻塞），处理循环定期取出样本拼接到
//! 滑动窗口缓冲区，每凑满一个窗口就分类一次，然后只保留尾部重叠部分。
//!
//! ```text
//! 设备线程 / ingest() ──► RingBuffer ──► drain_and_classify() ──► StatusStore
//!                        (drop-oldest)     (窗口 + 重叠)
//! ```

use super::classifier::{AudioClassifier, Classification};
use super::config::AudioStreamConfig;
use super::ring_buffer::{AudioRingBuffer, AudioRingConsumer, AudioRingProducer};
use crate::capture::{AudioSource, CaptureStream, Worker};
use crate::clock::Clock;
use crate::error::{SentinelError, SentinelResult};
use crate::status::{AudioStatus, StatusStore};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;

/// 音频处理统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioStreamStats {
    /// 已分类的窗口数
    pub windows_classified: u64,
    /// 置信度达标并发布的窗口数
    pub windows_accepted: u64,
    /// 推理失败的窗口数
    pub windows_failed: u64,
    /// 已分类的批量片段数
    pub clips_classified: u64,
    /// 过短被拒绝的批量片段数
    pub clips_rejected: u64,
    /// 当前缓冲的样本数（队列 + 窗口）
    pub buffered_samples: usize,
    /// 麦克风采集线程在运行
    pub device_active: bool,
    /// 队列溢出丢弃的样本数
    pub dropped_samples: u64,
}

/// 批量片段的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum ClipOutcome {
    /// 片段过短，未调用分类器
    TooShort { samples: usize, min_samples: usize },
    /// 已发布到状态缓存
    Accepted(Classification),
    /// 置信度低于阈值，状态不变
    BelowThreshold(Classification),
}

#[derive(Default)]
struct Counters {
    windows_classified: AtomicU64,
    windows_accepted: AtomicU64,
    windows_failed: AtomicU64,
    clips_classified: AtomicU64,
    clips_rejected: AtomicU64,
}

struct AudioShared {
    config: AudioStreamConfig,
    classifier: Arc<dyn AudioClassifier>,
    store: Arc<StatusStore>,
    clock: Arc<dyn Clock>,
    producer: AudioRingProducer,
    consumer: AudioRingConsumer,
    /// 滑动窗口缓冲区；锁只串行化 drain 调用，不与写入端竞争
    window: Mutex<Vec<f32>>,
    counters: Counters,
}

impl AudioShared {
    /// 发布达标结果；返回是否发布
    fn publish_if_accepted(&self, result: &Classification) -> bool {
        if result.confidence < self.config.acceptance_threshold {
            tracing::debug!(
                "情绪置信度不足，保留上次状态: {} ({:.3} < {:.3})",
                result.label,
                result.confidence,
                self.config.acceptance_threshold
            );
            return false;
        }

        self.store.set_audio_status(AudioStatus {
            emotion: result.label.clone(),
            confidence: result.confidence,
            active: true,
            timestamp: Some(self.clock.now()),
        });
        tracing::debug!("发布音频状态: {} ({:.3})", result.label, result.confidence);
        true
    }

    fn classify(&self, samples: &[f32]) -> SentinelResult<Classification> {
        self.classifier.infer(samples)?.sanitized()
    }

    fn drain_and_classify(&self) -> usize {
        let win = self.config.window_samples();
        let advance = win - self.config.overlap_samples();

        let mut window = self.window.lock();
        self.consumer.drain_into(&mut window);

        let mut processed = 0;
        while window.len() >= win {
            self.counters.windows_classified.fetch_add(1, Ordering::Relaxed);
            match self.classify(&window[..win]) {
                Ok(result) => {
                    if self.publish_if_accepted(&result) {
                        self.counters.windows_accepted.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    self.counters.windows_failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("⚠️ 音频窗口分类失败，跳过: {}", e);
                }
            }

            // 只保留窗口尾部的重叠部分及其后的新样本
            window.drain(..advance);
            processed += 1;
        }

        processed
    }
}

/// 音频流处理器
pub struct AudioStreamProcessor {
    shared: Arc<AudioShared>,
    worker: Worker,
    /// 设备采集流；锁同时串行化 start/stop
    capture: Mutex<Option<CaptureStream>>,
}

impl AudioStreamProcessor {
    pub fn new(
        config: AudioStreamConfig,
        classifier: Arc<dyn AudioClassifier>,
        store: Arc<StatusStore>,
        clock: Arc<dyn Clock>,
    ) -> SentinelResult<Self> {
        config.validate()?;

        let (producer, consumer) = AudioRingBuffer::new(config.queue_capacity_samples()).split();
        tracing::info!(
            "创建音频处理器: {} Hz, 窗口 {}s, 重叠 {}s, 队列 {} 样本",
            config.sample_rate,
            config.window_secs,
            config.overlap_secs,
            consumer.capacity()
        );

        Ok(Self {
            shared: Arc::new(AudioShared {
                window: Mutex::new(Vec::with_capacity(config.window_samples())),
                config,
                classifier,
                store,
                clock,
                producer,
                consumer,
                counters: Counters::default(),
            }),
            worker: Worker::new(),
            capture: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AudioStreamConfig {
        &self.shared.config
    }

    /// 追加样本（非阻塞，队列满时丢弃最旧样本）
    pub fn ingest(&self, samples: &[f32]) {
        self.shared.producer.write(samples);
    }

    /// 处理所有已凑满的窗口，返回处理的窗口数
    pub fn drain_and_classify(&self) -> usize {
        self.shared.drain_and_classify()
    }

    /// 批量模式：补零或截断到模型标准输入长度后分类一次
    pub fn classify_clip(&self, samples: &[f32]) -> SentinelResult<ClipOutcome> {
        let shared = &self.shared;
        let min_samples = shared.config.min_clip_samples();

        if samples.is_empty() || samples.len() < min_samples {
            shared.counters.clips_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("音频片段过短，忽略: {} < {} 样本", samples.len(), min_samples);
            return Ok(ClipOutcome::TooShort {
                samples: samples.len(),
                min_samples,
            });
        }

        let target = shared.config.clip_input_samples();
        let mut input = samples[..samples.len().min(target)].to_vec();
        input.resize(target, 0.0);

        let result = shared.classify(&input).map_err(|e| {
            tracing::warn!("⚠️ 音频片段分类失败: {}", e);
            e
        })?;
        shared.counters.clips_classified.fetch_add(1, Ordering::Relaxed);

        if shared.publish_if_accepted(&result) {
            Ok(ClipOutcome::Accepted(result))
        } else {
            Ok(ClipOutcome::BelowThreshold(result))
        }
    }

    /// 启动处理循环，可选地同时打开麦克风
    ///
    /// 已在运行时返回 `Ok(false)`。设备打开失败返回 `DeviceUnavailable`，
    /// 此时处理器保持未启动状态。
    pub fn start(&self, device: Option<AudioSource>) -> SentinelResult<bool> {
        let mut capture = self.capture.lock();
        if self.worker.is_running() {
            tracing::warn!("音频处理器已在运行");
            return Ok(false);
        }

        if let Some(source) = device {
            let producer = self.shared.producer.clone();
            let stream = CaptureStream::start(source, move |chunk: Vec<f32>| {
                producer.write(&chunk);
            })
            .map_err(|e| match e {
                SentinelError::DeviceUnavailable(_) => e,
                other => SentinelError::DeviceUnavailable(other.to_string()),
            })?;
            *capture = Some(stream);
        }

        let shared = Arc::clone(&self.shared);
        let interval = Duration::from_millis(self.shared.config.poll_interval_ms);
        if let Err(e) = self.worker.start("audio-processor", interval, move || {
            shared.drain_and_classify();
        }) {
            if let Some(mut stream) = capture.take() {
                stream.stop();
            }
            return Err(e);
        }

        Ok(true)
    }

    /// 停止处理循环并关闭设备；可重复调用
    pub fn stop(&self) {
        let mut capture = self.capture.lock();
        if let Some(mut stream) = capture.take() {
            stream.stop();
        }
        if self.worker.is_running() {
            self.worker.stop();
            tracing::info!("音频处理器已停止");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    /// 当前缓冲的样本数（队列 + 窗口）
    pub fn buffered_samples(&self) -> usize {
        let window = self.shared.window.lock().len();
        window + self.shared.consumer.available()
    }

    pub fn stats(&self) -> AudioStreamStats {
        let c = &self.shared.counters;
        AudioStreamStats {
            windows_classified: c.windows_classified.load(Ordering::Relaxed),
            windows_accepted: c.windows_accepted.load(Ordering::Relaxed),
            windows_failed: c.windows_failed.load(Ordering::Relaxed),
            clips_classified: c.clips_classified.load(Ordering::Relaxed),
            clips_rejected: c.clips_rejected.load(Ordering::Relaxed),
            buffered_samples: self.buffered_samples(),
            dropped_samples: self.shared.consumer.dropped_count(),
            device_active: self
                .capture
                .lock()
                .as_ref()
                .is_some_and(CaptureStream::is_running),
        }
    }
}

impl Drop for AudioStreamProcessor {
    fn drop(&mut self) {
        self.stop();
    }
}
