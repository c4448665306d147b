//! 告警闸门测试
//!
//! 冷却窗口、并发评估、无联系人与部分投递失败。

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use sentinel_core::alert::{
    AlertGate, AlertSender, AlertSettings, AuditLog, Contact, DeliveryStatus, GateOutcome,
    InMemoryAuditLog, LogAlertSender, SkipReason, StaticContactDirectory,
};
use sentinel_core::{RiskAssessment, SentinelError, SentinelResult, ThreatLevel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const OWNER: &str = "alice";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 22, 0, 0).unwrap()
}

fn high(score: f64) -> RiskAssessment {
    RiskAssessment {
        vision_risk: 1.0,
        audio_risk: 0.9,
        context_risk: 0.75,
        threat_score: score,
        threat_level: ThreatLevel::from_score(score),
    }
}

/// 对指定地址失败、其余成功的投递实现
struct FlakySender {
    failing: Vec<String>,
    attempts: AtomicUsize,
    delivered: Mutex<Vec<String>>,
}

impl FlakySender {
    fn new(failing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            attempts: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        })
    }
}

impl AlertSender for FlakySender {
    fn send(&self, destination: &str, _message: &str) -> SentinelResult<String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|d| d == destination) {
            return Err(SentinelError::Delivery {
                destination: destination.to_string(),
                reason: "carrier rejected".to_string(),
            });
        }
        self.delivered.lock().push(destination.to_string());
        Ok(format!("msg-{}", destination))
    }
}

fn contacts() -> Arc<StaticContactDirectory> {
    Arc::new(StaticContactDirectory::with_contacts(
        OWNER,
        vec![
            Contact::new("Bob", "+100"),
            Contact::new("Carol", "+200"),
            Contact::new("Dave", "+300"),
        ],
    ))
}

fn gate_with(sender: Arc<dyn AlertSender>, audit: Arc<InMemoryAuditLog>) -> AlertGate {
    AlertGate::new(OWNER, sender, contacts(), audit)
}

#[test]
fn test_cooldown_window() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let sender = Arc::new(LogAlertSender::new());
    let gate = gate_with(sender.clone(), audit.clone());
    let settings = AlertSettings::default();

    let first = gate.evaluate(&high(0.94), &settings, None, t0());
    assert!(first.is_dispatched());

    let second = gate.evaluate(&high(0.94), &settings, None, t0() + Duration::seconds(200));
    assert_eq!(
        second,
        GateOutcome::Skipped(SkipReason::CoolingDown {
            remaining_secs: 100
        })
    );

    let third = gate.evaluate(&high(0.94), &settings, None, t0() + Duration::seconds(301));
    assert!(third.is_dispatched());

    assert_eq!(sender.outbox().len(), 6);
    assert_eq!(audit.recent_alerts(10).len(), 2);
    assert_eq!(
        gate.cooldown_state().last_alert_at,
        Some(t0() + Duration::seconds(301))
    );
}

#[test]
fn test_cooldown_boundary_is_inclusive() {
    let gate = gate_with(Arc::new(LogAlertSender::new()), Arc::new(InMemoryAuditLog::default()));
    let settings = AlertSettings::default();

    assert!(gate.evaluate(&high(0.8), &settings, None, t0()).is_dispatched());
    assert!(gate
        .evaluate(&high(0.8), &settings, None, t0() + Duration::seconds(300))
        .is_dispatched());
}

#[test]
fn test_concurrent_high_readings_dispatch_once() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let sender = FlakySender::new(&[]);
    let gate = Arc::new(gate_with(sender.clone(), audit.clone()));
    let settings = AlertSettings::default();

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let barrier = Arc::clone(&barrier);
            let settings = settings.clone();
            thread::spawn(move || {
                barrier.wait();
                gate.evaluate(&high(0.9), &settings, None, t0()).is_dispatched()
            })
        })
        .collect();

    let dispatched = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|d| *d)
        .count();

    assert_eq!(dispatched, 1);
    assert_eq!(sender.attempts.load(Ordering::SeqCst), 3);
    assert_eq!(audit.recent_alerts(10).len(), 1);
}

#[test]
fn test_no_contacts_does_not_consume_cooldown() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let gate = AlertGate::new(
        OWNER,
        Arc::new(LogAlertSender::new()),
        Arc::new(StaticContactDirectory::new()),
        audit.clone(),
    );

    let outcome = gate.evaluate(&high(0.94), &AlertSettings::default(), None, t0());
    assert_eq!(outcome, GateOutcome::NoContacts);
    assert_eq!(gate.cooldown_state().last_alert_at, None);
    assert!(audit.recent_alerts(10).is_empty());

    // 占位已释放，下一次评估仍会走到联系人查询
    let again = gate.evaluate(&high(0.94), &AlertSettings::default(), None, t0());
    assert_eq!(again, GateOutcome::NoContacts);
}

#[test]
fn test_partial_failure_still_commits() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let sender = FlakySender::new(&["+200"]);
    let gate = gate_with(sender.clone(), audit.clone());

    let outcome = gate.evaluate(
        &high(0.94),
        &AlertSettings::default(),
        Some((12.5, 77.25)),
        t0(),
    );

    let outcomes = outcome.outcomes();
    assert!(outcome.is_dispatched());
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[1].contact, "Carol");
    assert_eq!(outcomes[1].status, DeliveryStatus::Failed);
    assert!(outcomes[1].error.is_some());
    assert_eq!(outcomes[2].status, DeliveryStatus::Sent);
    assert_eq!(outcomes[2].message_id.as_deref(), Some("msg-+300"));

    // 一个联系人失败不影响其余联系人
    assert_eq!(sender.delivered.lock().clone(), vec!["+100", "+300"]);
    assert_eq!(gate.cooldown_state().last_alert_at, Some(t0()));

    let records = audit.recent_alerts(1);
    assert_eq!(records[0].contacts_notified, vec!["Bob", "Dave"]);
    assert_eq!(records[0].status, "partial");
    assert_eq!(records[0].latitude, Some(12.5));
}

#[test]
fn test_all_failed_keeps_cooldown_open() {
    let sender = FlakySender::new(&["+100", "+200", "+300"]);
    let gate = gate_with(sender.clone(), Arc::new(InMemoryAuditLog::default()));

    let outcome = gate.evaluate(&high(0.94), &AlertSettings::default(), None, t0());
    assert!(matches!(outcome, GateOutcome::AllFailed(ref o) if o.len() == 3));
    assert_eq!(gate.cooldown_state().last_alert_at, None);

    let retry = gate.evaluate(&high(0.94), &AlertSettings::default(), None, t0());
    assert!(matches!(retry, GateOutcome::AllFailed(_)));
    assert_eq!(sender.attempts.load(Ordering::SeqCst), 6);
}

#[test]
fn test_predicate_skips() {
    let gate = gate_with(Arc::new(LogAlertSender::new()), Arc::new(InMemoryAuditLog::default()));

    let disabled = AlertSettings {
        auto_emergency_enabled: false,
        ..AlertSettings::default()
    };
    assert_eq!(
        gate.evaluate(&high(0.94), &disabled, None, t0()),
        GateOutcome::Skipped(SkipReason::Disabled)
    );

    assert_eq!(
        gate.evaluate(&high(0.5), &AlertSettings::default(), None, t0()),
        GateOutcome::Skipped(SkipReason::NotHigh(ThreatLevel::Medium))
    );

    let strict = AlertSettings {
        threat_threshold: 0.9,
        ..AlertSettings::default()
    };
    assert!(matches!(
        gate.evaluate(&high(0.85), &strict, None, t0()),
        GateOutcome::Skipped(SkipReason::BelowThreshold { .. })
    ));

    assert_eq!(gate.cooldown_state().last_alert_at, None);
}

#[test]
fn test_sos_delivers_during_cooldown() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let sender = Arc::new(LogAlertSender::new());
    let gate = gate_with(sender.clone(), audit.clone());
    let settings = AlertSettings::default();

    assert!(gate.evaluate(&high(0.94), &settings, None, t0()).is_dispatched());
    let cooling = gate.evaluate(&high(0.94), &settings, None, t0() + Duration::seconds(10));
    assert!(matches!(
        cooling,
        GateOutcome::Skipped(SkipReason::CoolingDown { .. })
    ));

    let sos = gate.dispatch_manual(Some((12.5, 77.25)), t0() + Duration::seconds(20));
    assert!(sos.is_dispatched());
    assert_eq!(sos.outcomes().len(), 3);

    let outbox = sender.outbox();
    assert_eq!(outbox.len(), 6);
    assert!(outbox[5].1.contains("SOS triggered by alice"));
    assert!(outbox[5].1.contains("maps?q=12.5,77.25"));

    // SOS 不改变自动告警的冷却
    assert_eq!(gate.cooldown_state().last_alert_at, Some(t0()));

    let records = audit.recent_alerts(1);
    assert_eq!(records[0].status, "sos");
    assert_eq!(records[0].threat_score, 1.0);
    assert_eq!(records[0].threat_level, ThreatLevel::High);
    assert_eq!(records[0].contacts_notified, vec!["Bob", "Carol", "Dave"]);
}

#[test]
fn test_sos_ignores_disabled_auto_alerts() {
    let gate = gate_with(Arc::new(LogAlertSender::new()), Arc::new(InMemoryAuditLog::default()));
    let disabled = AlertSettings {
        auto_emergency_enabled: false,
        ..AlertSettings::default()
    };

    assert_eq!(
        gate.evaluate(&high(0.94), &disabled, None, t0()),
        GateOutcome::Skipped(SkipReason::Disabled)
    );
    assert!(gate.dispatch_manual(None, t0()).is_dispatched());
}

#[test]
fn test_sos_failures_are_recorded() {
    let audit = Arc::new(InMemoryAuditLog::default());
    let sender = FlakySender::new(&["+100", "+200", "+300"]);
    let gate = gate_with(sender.clone(), audit.clone());

    let outcome = gate.dispatch_manual(None, t0());
    assert!(matches!(outcome, GateOutcome::AllFailed(ref o) if o.len() == 3));

    let records = audit.recent_alerts(1);
    assert_eq!(records[0].status, "sos-failed");
    assert!(records[0].contacts_notified.is_empty());

    let empty = AlertGate::new(
        OWNER,
        Arc::new(LogAlertSender::new()),
        Arc::new(StaticContactDirectory::new()),
        Arc::new(InMemoryAuditLog::default()),
    );
    assert_eq!(empty.dispatch_manual(None, t0()), GateOutcome::NoContacts);
}
