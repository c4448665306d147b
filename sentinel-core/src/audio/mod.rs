//! Audio 音频处理模块
//!
//! 麦克风 / 上传片段 → 有界队列 → 滑动窗口情绪分类 → StatusStore

pub mod classifier;
pub mod config;
pub mod decode;
pub mod device;
pub mod processor;
pub mod ring_buffer;

pub use classifier::{AudioClassifier, Classification};
#[cfg(feature = "onnx")]
pub use classifier::{OnnxEmotionClassifier, OnnxEmotionConfig};
pub use config::AudioStreamConfig;
pub use decode::{decode_payload, AudioPayload};
pub use device::{PwRecordConfig, PwRecordSource};
pub use processor::{AudioStreamProcessor, AudioStreamStats, ClipOutcome};
pub use ring_buffer::{AudioRingBuffer, AudioRingConsumer, AudioRingProducer, RingBuffer};
