//! Fusion 风险融合模块

pub mod context;
pub mod engine;

pub use context::{Context, LocationType};
pub use engine::{EmotionClass, FusionWeights, RiskAssessment, RiskFusionEngine, ThreatLevel};
