//! 视觉处理配置

use crate::error::{SentinelError, SentinelResult};
use serde::{Deserialize, Serialize};

/// VisionFrameProcessor 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// 运动判定阈值（灰度绝对差之和 / 255）
    pub motion_threshold: f64,
    /// 待处理帧队列容量，满时丢弃最旧帧
    pub frame_queue_capacity: usize,
    /// 处理循环轮询间隔 (毫秒)
    pub poll_interval_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            motion_threshold: 5000.0,
            frame_queue_capacity: 4,
            poll_interval_ms: 100,
        }
    }
}

impl VisionConfig {
    pub fn validate(&self) -> SentinelResult<()> {
        if !(self.motion_threshold >= 0.0) {
            return Err(SentinelError::Configuration(format!(
                "vision.motion_threshold ({}) must be non-negative",
                self.motion_threshold
            )));
        }
        if self.frame_queue_capacity == 0 {
            return Err(SentinelError::Configuration(
                "vision.frame_queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
