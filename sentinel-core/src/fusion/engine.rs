//! 风险融合引擎
//!
//! 纯函数：同样的输入永远得到同样的 RiskAssessment。
//!
//! ```text
//! vision_risk  = 0.5·min(people/5, 1) + 0.25·motion + 0.25·pose
//! audio_risk   = 高危情绪: min(conf + 0.3, 1)，其他: conf · 0.4
//! context_risk = (time_factor + location_factor) / 2
//! threat_score = w_v·vision + w_a·audio + w_c·context
//! ```

use super::context::Context;
use crate::error::{SentinelError, SentinelResult};
use crate::status::{AudioStatus, StatusSnapshot, VisionStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 达到该人数时人数分量饱和
const PEOPLE_SATURATION: f64 = 5.0;

const NIGHT_FACTOR: f64 = 0.7;
const DAY_FACTOR: f64 = 0.2;
const RISKY_LOCATION_FACTOR: f64 = 0.8;
const SAFE_LOCATION_FACTOR: f64 = 0.2;

const HIGH_BREAKPOINT: f64 = 0.7;
const MEDIUM_BREAKPOINT: f64 = 0.4;

/// 融合权重（和必须为 1）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub vision: f64,
    pub audio: f64,
    pub context: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vision: 0.5,
            audio: 0.4,
            context: 0.1,
        }
    }
}

impl FusionWeights {
    pub fn validate(&self) -> SentinelResult<()> {
        for (name, w) in [("vision", self.vision), ("audio", self.audio), ("context", self.context)] {
            if !(0.0..=1.0).contains(&w) {
                return Err(SentinelError::Configuration(format!(
                    "fusion.{} weight ({}) must be in [0, 1]",
                    name, w
                )));
            }
        }
        let sum = self.vision + self.audio + self.context;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(SentinelError::Configuration(format!(
                "fusion weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// 威胁等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
}

impl ThreatLevel {
    /// 固定分段：≥ 0.7 HIGH，≥ 0.4 MEDIUM，其余 LOW
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_BREAKPOINT {
            ThreatLevel::High
        } else if score >= MEDIUM_BREAKPOINT {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次融合的结果，所有分数保留两位小数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub vision_risk: f64,
    pub audio_risk: f64,
    pub context_risk: f64,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
}

/// 情绪标签归类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmotionClass {
    HighThreat,
    Other,
}

impl EmotionClass {
    /// 大小写不敏感，同义词归一
    pub fn classify(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "angry" | "anger" | "fear" | "fearful" | "afraid" | "scared" | "panic" | "panicked"
            | "distress" | "distressed" => EmotionClass::HighThreat,
            _ => EmotionClass::Other,
        }
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// 风险融合引擎
#[derive(Debug, Clone, Default)]
pub struct RiskFusionEngine {
    weights: FusionWeights,
}

impl RiskFusionEngine {
    pub fn new(weights: FusionWeights) -> SentinelResult<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &FusionWeights {
        &self.weights
    }

    /// 视觉风险；未激活时为 0
    pub fn vision_risk(vision: Option<&VisionStatus>) -> f64 {
        match vision {
            Some(v) if v.active => {
                let crowd = (v.people_count as f64 / PEOPLE_SATURATION).min(1.0);
                let motion = if v.motion_detected { 1.0 } else { 0.0 };
                let pose = if v.pose_risk { 1.0 } else { 0.0 };
                0.5 * crowd + 0.25 * motion + 0.25 * pose
            }
            _ => 0.0,
        }
    }

    /// 音频风险；未激活时为 0
    pub fn audio_risk(audio: Option<&AudioStatus>) -> f64 {
        match audio {
            Some(a) if a.active => {
                let confidence = a.confidence.clamp(0.0, 1.0);
                match EmotionClass::classify(&a.emotion) {
                    EmotionClass::HighThreat => (confidence + 0.3).min(1.0),
                    EmotionClass::Other => confidence * 0.4,
                }
            }
            _ => 0.0,
        }
    }

    /// 上下文风险；未提供时为 0
    pub fn context_risk(context: Option<&Context>) -> f64 {
        match context {
            Some(ctx) => {
                let time_factor = if ctx.is_night() { NIGHT_FACTOR } else { DAY_FACTOR };
                let location_factor = if ctx.location_type.is_high_risk() {
                    RISKY_LOCATION_FACTOR
                } else {
                    SAFE_LOCATION_FACTOR
                };
                (time_factor + location_factor) / 2.0
            }
            None => 0.0,
        }
    }

    /// 融合三路信号
    ///
    /// 四个分数只在返回前统一四舍五入一次；等级由舍入后的分数决定。
    pub fn compute(
        &self,
        vision: Option<&VisionStatus>,
        audio: Option<&AudioStatus>,
        context: Option<&Context>,
    ) -> RiskAssessment {
        let vision_risk = Self::vision_risk(vision);
        let audio_risk = Self::audio_risk(audio);
        let context_risk = Self::context_risk(context);

        let threat_score = self.weights.vision * vision_risk
            + self.weights.audio * audio_risk
            + self.weights.context * context_risk;
        let threat_score = round2(threat_score.clamp(0.0, 1.0));

        RiskAssessment {
            vision_risk: round2(vision_risk),
            audio_risk: round2(audio_risk),
            context_risk: round2(context_risk),
            threat_score,
            threat_level: ThreatLevel::from_score(threat_score),
        }
    }

    /// 对状态快照做融合
    pub fn compute_snapshot(&self, snapshot: &StatusSnapshot, context: Option<&Context>) -> RiskAssessment {
        self.compute(Some(&snapshot.vision), Some(&snapshot.audio), context)
    }
}
