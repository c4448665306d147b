//! 音频流配置

use crate::error::{SentinelError, SentinelResult};
use serde::{Deserialize, Serialize};

/// AudioStreamProcessor 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioStreamConfig {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 分类窗口时长 (秒)
    pub window_secs: f64,
    /// 相邻窗口重叠时长 (秒)
    pub overlap_secs: f64,
    /// 置信度低于此值的结果不发布
    pub acceptance_threshold: f64,
    /// 采集队列容量 (秒)，满时丢弃最旧的样本
    pub queue_capacity_secs: f64,
    /// 处理循环轮询间隔 (毫秒)
    pub poll_interval_ms: u64,
    /// 批量模式下模型的标准输入时长 (秒)
    pub clip_input_secs: f64,
    /// 批量模式下可接受的最短片段 (秒)
    pub min_clip_secs: f64,
}

impl Default for AudioStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            window_secs: 3.0,
            overlap_secs: 1.0,
            acceptance_threshold: 0.3,
            queue_capacity_secs: 10.0,
            poll_interval_ms: 50,
            clip_input_secs: 30.0,
            min_clip_secs: 0.1,
        }
    }
}

impl AudioStreamConfig {
    pub fn validate(&self) -> SentinelResult<()> {
        if self.sample_rate == 0 {
            return Err(SentinelError::Configuration(
                "audio.sample_rate must be positive".to_string(),
            ));
        }
        if !(self.window_secs > 0.0) {
            return Err(SentinelError::Configuration(
                "audio.window_secs must be positive".to_string(),
            ));
        }
        if !(self.overlap_secs >= 0.0 && self.overlap_secs < self.window_secs) {
            return Err(SentinelError::Configuration(format!(
                "audio.overlap_secs ({}) must be in [0, window_secs = {})",
                self.overlap_secs, self.window_secs
            )));
        }
        // 处理循环按取整后的样本数推进，每个窗口至少前进一个样本
        let (win, overlap) = (self.window_samples(), self.overlap_samples());
        if win == 0 || overlap >= win {
            return Err(SentinelError::Configuration(format!(
                "audio window ({} samples) must exceed overlap ({} samples) at {} Hz",
                win, overlap, self.sample_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(SentinelError::Configuration(format!(
                "audio.acceptance_threshold ({}) must be in [0, 1]",
                self.acceptance_threshold
            )));
        }
        if self.queue_capacity_samples() < self.window_samples() {
            return Err(SentinelError::Configuration(
                "audio.queue_capacity_secs must hold at least one window".to_string(),
            ));
        }
        if !(self.min_clip_secs >= 0.0 && self.clip_input_secs > 0.0) {
            return Err(SentinelError::Configuration(
                "audio clip durations must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn secs_to_samples(&self, secs: f64) -> usize {
        (secs * self.sample_rate as f64).round().max(0.0) as usize
    }

    /// 窗口样本数
    pub fn window_samples(&self) -> usize {
        self.secs_to_samples(self.window_secs)
    }

    /// 重叠样本数
    pub fn overlap_samples(&self) -> usize {
        self.secs_to_samples(self.overlap_secs)
    }

    pub fn queue_capacity_samples(&self) -> usize {
        self.secs_to_samples(self.queue_capacity_secs)
    }

    pub fn clip_input_samples(&self) -> usize {
        self.secs_to_samples(self.clip_input_secs)
    }

    pub fn min_clip_samples(&self) -> usize {
        self.secs_to_samples(self.min_clip_secs)
    }
}
