//! 告警闸门
//!
//! 把 RiskAssessment 转换为“每个冷却窗口至多一次”的紧急通知。
//!
//! 冷却检查与占位在同一临界区内完成；投递期间不持有任何锁，
//! 投递结束后再次加锁提交 (`last_alert_at = now`) 或释放占位。

use super::collaborators::{AlertRecord, AlertSender, AuditLog, Contact, ContactDirectory};
use super::settings::AlertSettings;
use crate::fusion::{RiskAssessment, ThreatLevel};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// 冷却状态（全局单槽，不区分联系人）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CooldownState {
    pub last_alert_at: Option<DateTime<Utc>>,
    /// 有投递正在进行
    in_flight: bool,
}

/// 单个联系人的投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertOutcome {
    /// 联系人姓名
    pub contact: String,
    pub destination: String,
    pub status: DeliveryStatus,
    /// 投递方返回的消息 ID
    pub message_id: Option<String>,
    pub error: Option<String>,
}

/// 未触发告警的原因
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// 自动告警已关闭
    Disabled,
    /// 威胁等级不是 HIGH
    NotHigh(ThreatLevel),
    /// 分数低于用户阈值
    BelowThreshold { score: f64, threshold: f64 },
    /// 仍在冷却中
    CoolingDown { remaining_secs: i64 },
    /// 另一次投递正在进行
    DispatchInFlight,
}

/// 闸门判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Skipped(SkipReason),
    /// 没有可用联系人，冷却不变
    NoContacts,
    /// 联系人目录不可用，冷却不变
    DirectoryUnavailable(String),
    /// 至少一个联系人投递成功，冷却已更新
    Dispatched(Vec<AlertOutcome>),
    /// 全部投递失败，冷却不变
    AllFailed(Vec<AlertOutcome>),
}

impl GateOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, GateOutcome::Dispatched(_))
    }

    /// 所有投递结果（未投递时为空）
    pub fn outcomes(&self) -> &[AlertOutcome] {
        match self {
            GateOutcome::Dispatched(o) | GateOutcome::AllFailed(o) => o,
            _ => &[],
        }
    }
}

/// 手动 SOS 使用的固定分数
pub const SOS_SCORE: f64 = 1.0;

fn append_location(message: &mut String, coordinates: Option<(f64, f64)>) {
    if let Some((lat, lon)) = coordinates {
        message.push_str(&format!(
            " Location: https://www.google.com/maps?q={},{}",
            lat, lon
        ));
    }
}

/// 组装告警内容
pub fn compose_message(
    owner: &str,
    score: f64,
    at: DateTime<Utc>,
    coordinates: Option<(f64, f64)>,
) -> String {
    let mut message = format!(
        "EMERGENCY ALERT! High threat detected for {}. Threat score: {:.2} | Time: {}",
        owner,
        score,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    append_location(&mut message, coordinates);
    message
}

/// 组装手动 SOS 内容
pub fn compose_sos_message(
    owner: &str,
    at: DateTime<Utc>,
    coordinates: Option<(f64, f64)>,
) -> String {
    let mut message = format!(
        "EMERGENCY ALERT! SOS triggered by {}. Threat score: {:.2} | Time: {}",
        owner,
        SOS_SCORE,
        at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    append_location(&mut message, coordinates);
    message
}

/// 占位守卫：未提交就被丢弃时释放占位
struct Reservation<'a> {
    state: &'a Mutex<CooldownState>,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.last_alert_at = Some(at);
        state.in_flight = false;
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.state.lock().in_flight = false;
        }
    }
}

/// 告警闸门
pub struct AlertGate {
    owner: String,
    sender: Arc<dyn AlertSender>,
    contacts: Arc<dyn ContactDirectory>,
    audit: Arc<dyn AuditLog>,
    cooldown: Mutex<CooldownState>,
}

impl AlertGate {
    pub fn new(
        owner: impl Into<String>,
        sender: Arc<dyn AlertSender>,
        contacts: Arc<dyn ContactDirectory>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            owner: owner.into(),
            sender,
            contacts,
            audit,
            cooldown: Mutex::new(CooldownState::default()),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cooldown_state(&self) -> CooldownState {
        self.cooldown.lock().clone()
    }

    /// 谓词检查 + 冷却占位（同一临界区）
    fn reserve(
        &self,
        assessment: &RiskAssessment,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Result<Reservation<'_>, SkipReason> {
        if !settings.auto_emergency_enabled {
            return Err(SkipReason::Disabled);
        }
        if assessment.threat_level != ThreatLevel::High {
            return Err(SkipReason::NotHigh(assessment.threat_level));
        }
        if assessment.threat_score < settings.threat_threshold {
            return Err(SkipReason::BelowThreshold {
                score: assessment.threat_score,
                threshold: settings.threat_threshold,
            });
        }

        let mut state = self.cooldown.lock();
        if state.in_flight {
            return Err(SkipReason::DispatchInFlight);
        }
        if let Some(last) = state.last_alert_at {
            let elapsed = (now - last).num_seconds();
            let cooldown = i64::try_from(settings.alert_cooldown_seconds).unwrap_or(i64::MAX);
            if elapsed < cooldown {
                return Err(SkipReason::CoolingDown {
                    remaining_secs: cooldown - elapsed,
                });
            }
        }
        state.in_flight = true;

        Ok(Reservation {
            state: &self.cooldown,
            committed: false,
        })
    }

    /// 评估一次风险结果，必要时向所有联系人投递
    pub fn evaluate(
        &self,
        assessment: &RiskAssessment,
        settings: &AlertSettings,
        coordinates: Option<(f64, f64)>,
        now: DateTime<Utc>,
    ) -> GateOutcome {
        let reservation = match self.reserve(assessment, settings, now) {
            Ok(reservation) => reservation,
            Err(reason) => {
                tracing::debug!("未触发告警: {:?}", reason);
                return GateOutcome::Skipped(reason);
            }
        };

        let contacts = match self.load_contacts() {
            Ok(contacts) => contacts,
            Err(outcome) => return outcome,
        };

        let message = compose_message(&self.owner, assessment.threat_score, now, coordinates);
        tracing::info!(
            "🚨 触发紧急告警: {} 分数 {:.2}, {} 个联系人",
            self.owner,
            assessment.threat_score,
            contacts.len()
        );

        let outcomes = self.deliver(&contacts, &message);
        let notified = notified_contacts(&outcomes);

        if notified.is_empty() {
            tracing::warn!("⚠️ 所有联系人投递失败，冷却不变");
            return GateOutcome::AllFailed(outcomes);
        }

        reservation.commit(now);

        let status = if notified.len() == outcomes.len() {
            "sent"
        } else {
            "partial"
        };
        self.record(
            now,
            assessment.threat_level,
            assessment.threat_score,
            notified,
            coordinates,
            status,
        );

        GateOutcome::Dispatched(outcomes)
    }

    /// 手动 SOS：不看自动告警开关、威胁等级与冷却，直接通知所有联系人
    ///
    /// 不读取也不更新冷却状态。无论投递结果如何都写入告警记录。
    pub fn dispatch_manual(
        &self,
        coordinates: Option<(f64, f64)>,
        now: DateTime<Utc>,
    ) -> GateOutcome {
        tracing::warn!("🆘 收到手动 SOS: {}", self.owner);

        let contacts = match self.load_contacts() {
            Ok(contacts) => contacts,
            Err(outcome) => return outcome,
        };

        let message = compose_sos_message(&self.owner, now, coordinates);
        let outcomes = self.deliver(&contacts, &message);
        let notified = notified_contacts(&outcomes);
        let delivered = !notified.is_empty();

        self.record(
            now,
            ThreatLevel::High,
            SOS_SCORE,
            notified,
            coordinates,
            if delivered { "sos" } else { "sos-failed" },
        );

        if delivered {
            GateOutcome::Dispatched(outcomes)
        } else {
            tracing::warn!("⚠️ SOS 所有联系人投递失败");
            GateOutcome::AllFailed(outcomes)
        }
    }

    /// 查询联系人；不可用或为空时给出对应结果
    fn load_contacts(&self) -> Result<Vec<Contact>, GateOutcome> {
        match self.contacts.active_contacts(&self.owner) {
            Ok(contacts) if contacts.is_empty() => {
                tracing::warn!("⚠️ 没有紧急联系人: {}", self.owner);
                Err(GateOutcome::NoContacts)
            }
            Ok(contacts) => Ok(contacts),
            Err(e) => {
                tracing::warn!("⚠️ 联系人目录不可用: {}", e);
                Err(GateOutcome::DirectoryUnavailable(e.to_string()))
            }
        }
    }

    /// 逐个联系人投递，单个失败不影响其余
    fn deliver(&self, contacts: &[Contact], message: &str) -> Vec<AlertOutcome> {
        contacts
            .iter()
            .map(|contact| match self.sender.send(&contact.destination, message) {
                Ok(id) => AlertOutcome {
                    contact: contact.name.clone(),
                    destination: contact.destination.clone(),
                    status: DeliveryStatus::Sent,
                    message_id: Some(id),
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("⚠️ 告警投递失败 {}: {}", contact.name, e);
                    AlertOutcome {
                        contact: contact.name.clone(),
                        destination: contact.destination.clone(),
                        status: DeliveryStatus::Failed,
                        message_id: None,
                        error: Some(e.to_string()),
                    }
                }
            })
            .collect()
    }

    fn record(
        &self,
        at: DateTime<Utc>,
        threat_level: ThreatLevel,
        threat_score: f64,
        contacts_notified: Vec<String>,
        coordinates: Option<(f64, f64)>,
        status: &str,
    ) {
        let record = AlertRecord {
            timestamp: at,
            owner: self.owner.clone(),
            threat_level,
            threat_score,
            contacts_notified,
            latitude: coordinates.map(|c| c.0),
            longitude: coordinates.map(|c| c.1),
            status: status.to_string(),
        };
        if let Err(e) = self.audit.append_alert(record) {
            tracing::warn!("⚠️ 告警记录写入失败: {}", e);
        }
    }
}

fn notified_contacts(outcomes: &[AlertOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter(|o| o.status == DeliveryStatus::Sent)
        .map(|o| o.contact.clone())
        .collect()
}
