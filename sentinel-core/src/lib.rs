//! Sentinel Core Engine
//!
//! 音频 + 视觉实时融合的人身安全风险评估与紧急告警核心

#![warn(rust_2018_idioms)]

pub mod alert;
pub mod audio;
pub mod capture;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod status;
pub mod vision;

// Re-export key types
pub use alert::{AlertGate, AlertSettings, AlertSettingsPatch, GateOutcome};
pub use audio::{AudioClassifier, AudioStreamProcessor, Classification};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SentinelConfig;
pub use engine::{Collaborators, Devices, SafetyEngine, ThreatReport};
pub use error::{SentinelError, SentinelResult};
pub use fusion::{Context, LocationType, RiskAssessment, RiskFusionEngine, ThreatLevel};
pub use status::{AudioStatus, StatusSnapshot, StatusStore, VisionStatus};
pub use vision::{Frame, VisionDetector, VisionFrameProcessor};

/// 初始化日志系统
///
/// 日志级别由 SENTINEL_LOG 控制（默认 info），语法同 RUST_LOG。
///
/// 注意: 此函数可以安全地多次调用
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("SENTINEL_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    // 已经初始化过时 try_init() 返回错误，忽略即可
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_init_logging_twice() {
        super::init_logging();
        super::init_logging();
    }
}
