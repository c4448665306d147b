//! 告警相关的外部协作者
//!
//! - `AlertSender`: 短信/电话投递
//! - `ContactDirectory`: 紧急联系人
//! - `AuditLog`: 威胁与告警记录
//!
//! 这里附带的实现只在内存中工作，供嵌入方替换。

use crate::error::{SentinelError, SentinelResult};
use crate::fusion::{LocationType, ThreatLevel};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

/// 紧急联系人
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    /// 电话号码等投递地址
    pub destination: String,
}

impl Contact {
    pub fn new(name: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
        }
    }
}

/// 告警投递
pub trait AlertSender: Send + Sync {
    /// 成功时返回投递方的消息 ID，失败时返回 `Delivery`
    fn send(&self, destination: &str, message: &str) -> SentinelResult<String>;
}

/// 联系人目录
pub trait ContactDirectory: Send + Sync {
    fn active_contacts(&self, owner: &str) -> SentinelResult<Vec<Contact>>;
}

/// 单次融合的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatRecord {
    pub timestamp: DateTime<Utc>,
    pub vision_risk: f64,
    pub audio_risk: f64,
    pub context_risk: f64,
    pub threat_score: f64,
    pub threat_level: ThreatLevel,
    pub location_type: Option<LocationType>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// 一次成功告警的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub timestamp: DateTime<Utc>,
    pub owner: String,
    pub threat_level: ThreatLevel,
    pub threat_score: f64,
    /// 成功通知到的联系人姓名
    pub contacts_notified: Vec<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// "sent"、"partial"，手动求救为 "sos" 或 "sos-failed"
    pub status: String,
}

/// 审计日志
pub trait AuditLog: Send + Sync {
    fn append_threat(&self, record: ThreatRecord) -> SentinelResult<()>;

    fn append_alert(&self, record: AlertRecord) -> SentinelResult<()>;

    /// 最近 n 条威胁记录，最新的在前
    fn recent(&self, n: usize) -> Vec<ThreatRecord>;

    /// 最近 n 条告警记录，最新的在前
    fn recent_alerts(&self, n: usize) -> Vec<AlertRecord>;
}

/// 只写日志、并保留发件箱的投递实现
#[derive(Debug, Default)]
pub struct LogAlertSender {
    next_id: AtomicU64,
    outbox: Mutex<Vec<(String, String)>>,
}

impl LogAlertSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已发送的 (地址, 内容)
    pub fn outbox(&self) -> Vec<(String, String)> {
        self.outbox.lock().clone()
    }
}

impl AlertSender for LogAlertSender {
    fn send(&self, destination: &str, message: &str) -> SentinelResult<String> {
        if destination.trim().is_empty() {
            return Err(SentinelError::Delivery {
                destination: destination.to_string(),
                reason: "empty destination".to_string(),
            });
        }

        let id = format!("log-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!("📨 告警 {} → {}: {}", id, destination, message);
        self.outbox
            .lock()
            .push((destination.to_string(), message.to_string()));
        Ok(id)
    }
}

/// 固定的联系人目录
#[derive(Debug, Default)]
pub struct StaticContactDirectory {
    contacts: RwLock<HashMap<String, Vec<Contact>>>,
}

impl StaticContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contacts(owner: impl Into<String>, contacts: Vec<Contact>) -> Self {
        let directory = Self::new();
        directory.set_contacts(owner, contacts);
        directory
    }

    pub fn set_contacts(&self, owner: impl Into<String>, contacts: Vec<Contact>) {
        self.contacts.write().insert(owner.into(), contacts);
    }
}

impl ContactDirectory for StaticContactDirectory {
    fn active_contacts(&self, owner: &str) -> SentinelResult<Vec<Contact>> {
        Ok(self.contacts.read().get(owner).cloned().unwrap_or_default())
    }
}

/// 内存中的审计日志（每类最多保留 `max_records` 条）
#[derive(Debug)]
pub struct InMemoryAuditLog {
    max_records: usize,
    threats: Mutex<VecDeque<ThreatRecord>>,
    alerts: Mutex<VecDeque<AlertRecord>>,
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl InMemoryAuditLog {
    pub fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            max_records,
            threats: Mutex::new(VecDeque::new()),
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    fn push_bounded<T>(queue: &Mutex<VecDeque<T>>, record: T, max: usize) {
        let mut queue = queue.lock();
        queue.push_back(record);
        while queue.len() > max {
            queue.pop_front();
        }
    }

    fn newest_first<T: Clone>(queue: &Mutex<VecDeque<T>>, n: usize) -> Vec<T> {
        queue.lock().iter().rev().take(n).cloned().collect()
    }
}

impl AuditLog for InMemoryAuditLog {
    fn append_threat(&self, record: ThreatRecord) -> SentinelResult<()> {
        Self::push_bounded(&self.threats, record, self.max_records);
        Ok(())
    }

    fn append_alert(&self, record: AlertRecord) -> SentinelResult<()> {
        Self::push_bounded(&self.alerts, record, self.max_records);
        Ok(())
    }

    fn recent(&self, n: usize) -> Vec<ThreatRecord> {
        Self::newest_first(&self.threats, n)
    }

    fn recent_alerts(&self, n: usize) -> Vec<AlertRecord> {
        Self::newest_first(&self.alerts, n)
    }
}
