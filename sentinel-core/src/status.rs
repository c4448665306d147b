//! 状态缓存
//!
//! 音频/视觉最新状态的线程安全缓存。每个模态只有一个写者（对应的处理器），
//! 读者（融合引擎、状态查询）通过 snapshot() 一次性取得一致的状态对。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// 音频情绪状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStatus {
    /// 情绪标签
    pub emotion: String,
    /// 置信度 [0, 1]
    pub confidence: f64,
    /// 是否有有效结果
    pub active: bool,
    /// 发布时间
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for AudioStatus {
    fn default() -> Self {
        Self {
            emotion: "neutral".to_string(),
            confidence: 0.0,
            active: false,
            timestamp: None,
        }
    }
}

/// 视觉检测状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisionStatus {
    /// 画面中的人数
    pub people_count: u32,
    /// 举手/防御姿态
    pub pose_risk: bool,
    /// 帧差检测到运动
    pub motion_detected: bool,
    /// 是否有有效结果
    pub active: bool,
    /// 发布时间
    pub timestamp: Option<DateTime<Utc>>,
}

/// 一致的状态快照
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub audio: AudioStatus,
    pub vision: VisionStatus,
    /// 音频状态发布次数
    pub audio_version: u64,
    /// 视觉状态发布次数
    pub vision_version: u64,
}

/// 状态缓存
///
/// 一把锁保护两份状态；临界区只做结构体拷贝，不做推理或 I/O。
#[derive(Debug, Default)]
pub struct StatusStore {
    inner: Mutex<StatusSnapshot>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布音频状态（仅由 AudioStreamProcessor 调用）
    pub fn set_audio_status(&self, status: AudioStatus) {
        let mut inner = self.inner.lock();
        inner.audio = status;
        inner.audio_version += 1;
    }

    /// 发布视觉状态（仅由 VisionFrameProcessor 调用）
    pub fn set_vision_status(&self, status: VisionStatus) {
        let mut inner = self.inner.lock();
        inner.vision = status;
        inner.vision_version += 1;
    }

    /// 在同一临界区内读取两份状态
    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner.lock().clone()
    }

    pub fn audio_status(&self) -> AudioStatus {
        self.inner.lock().audio.clone()
    }

    pub fn vision_status(&self) -> VisionStatus {
        self.inner.lock().vision.clone()
    }
}
