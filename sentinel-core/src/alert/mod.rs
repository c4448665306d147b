//! Alert 紧急告警模块
//!
//! RiskAssessment → 冷却闸门 → 联系人投递 → 审计记录

pub mod collaborators;
pub mod gate;
pub mod settings;

pub use collaborators::{
    AlertRecord, AlertSender, AuditLog, Contact, ContactDirectory, InMemoryAuditLog,
    LogAlertSender, StaticContactDirectory, ThreatRecord,
};
pub use gate::{
    compose_message, compose_sos_message, AlertGate, AlertOutcome, CooldownState, DeliveryStatus, GateOutcome,
    SkipReason, SOS_SCORE,
};
pub use settings::{
    AlertSettings, AlertSettingsPatch, FileSettingsStore, InMemorySettingsStore, SettingsStore,
};
