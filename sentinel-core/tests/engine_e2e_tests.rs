//! SafetyEngine 端到端测试
//!
//! 用 hound 生成 WAV、用 image 生成 PNG，经 ingest_* 接口走完
//! 解码 → 处理器 → 状态缓存 → 融合 → 告警 的完整流程。

use chrono::{TimeZone, Utc};
use image::{ImageFormat, Rgb, RgbImage};
use sentinel_core::alert::{
    AlertSettingsPatch, Contact, FileSettingsStore, GateOutcome, InMemoryAuditLog, LogAlertSender,
    SkipReason, StaticContactDirectory,
};
use sentinel_core::audio::ClipOutcome;
use sentinel_core::capture::SensorSource;
use sentinel_core::engine::{AudioIngest, Devices};
use sentinel_core::vision::PoseKeypoints;
use sentinel_core::{
    Classification, Collaborators, Context, Frame, LocationType, ManualClock, SafetyEngine,
    SentinelConfig, SentinelError, SentinelResult, ThreatLevel, VisionDetector,
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// 按音量判断情绪的分类器：响亮 → fearful，安静 → neutral
struct LoudnessClassifier;

impl sentinel_core::AudioClassifier for LoudnessClassifier {
    fn infer(&self, window: &[f32]) -> SentinelResult<Classification> {
        let peak = window.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak > 0.4 {
            Ok(Classification::new("fearful", 0.6))
        } else {
            Ok(Classification::new("neutral", 0.5))
        }
    }
}

/// 红色通道第一个像素值即人数，绿色通道非零表示举手
struct PixelDetector;

impl VisionDetector for PixelDetector {
    fn detect_people(&self, frame: &Frame) -> SentinelResult<usize> {
        Ok(frame.rgb().get_pixel(0, 0)[0] as usize)
    }

    fn detect_pose(&self, frame: &Frame) -> SentinelResult<Option<Vec<PoseKeypoints>>> {
        use sentinel_core::vision::Keypoint;

        if frame.rgb().get_pixel(0, 0)[1] == 0 {
            return Ok(Some(Vec::new()));
        }
        let mut points = vec![None; 17];
        points[5] = Some(Keypoint::new(40.0, 100.0));
        points[6] = Some(Keypoint::new(60.0, 100.0));
        points[9] = Some(Keypoint::new(40.0, 20.0));
        points[10] = Some(Keypoint::new(60.0, 20.0));
        Ok(Some(vec![PoseKeypoints::new(points)]))
    }
}

fn wav_clip(amplitude: f32, secs: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let n = (16000.0 * secs) as usize;
        for i in 0..n {
            let t = i as f32 / 16000.0;
            let s = amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn png_frame(people: u8, hands_up: bool, luma: u8) -> Vec<u8> {
    let mut img = RgbImage::from_pixel(64, 64, Rgb([luma, luma, luma]));
    img.put_pixel(0, 0, Rgb([people, if hands_up { 1 } else { 0 }, luma]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn engine_with(
    sender: Arc<LogAlertSender>,
    contacts: Vec<Contact>,
) -> (SafetyEngine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap(),
    ));
    let collaborators = Collaborators::new("alice", Arc::new(LoudnessClassifier), Arc::new(PixelDetector))
        .with_sender(sender)
        .with_contacts(Arc::new(StaticContactDirectory::with_contacts("alice", contacts)))
        .with_clock(clock.clone());
    let mut config = SentinelConfig::default();
    // 64x64 帧的最大帧差为 4096
    config.vision.motion_threshold = 1000.0;

    (SafetyEngine::new(config, collaborators).unwrap(), clock)
}

#[test]
fn test_uploads_flow_to_high_threat_alert() {
    let sender = Arc::new(LogAlertSender::new());
    let (engine, _clock) = engine_with(sender.clone(), vec![Contact::new("Bob", "+100")]);

    let ingest = engine.ingest_audio(&wav_clip(0.8, 2.0)).unwrap();
    assert!(matches!(ingest, AudioIngest::Clip(ClipOutcome::Accepted(_))));

    engine.ingest_frame(&png_frame(6, false, 0)).unwrap();
    engine.ingest_frame(&png_frame(6, true, 255)).unwrap();
    assert_eq!(engine.vision().process_pending(), 2);

    let status = engine.get_status();
    assert_eq!(status.audio.emotion, "fearful");
    assert_eq!(status.vision.people_count, 6);
    assert!(status.vision.pose_risk);
    assert!(status.vision.motion_detected);

    let context = Context::new(23, LocationType::Isolated)
        .unwrap()
        .with_coordinates(12.5, 77.25);
    let report = engine.compute_risk(Some(context));

    assert_eq!(report.assessment.threat_score, 0.94);
    assert_eq!(report.assessment.threat_level, ThreatLevel::High);
    assert!(report.alert.is_dispatched());
    assert_eq!(report.recent.len(), 1);

    let outbox = sender.outbox();
    assert_eq!(outbox.len(), 1);
    assert!(outbox[0].1.contains("Threat score: 0.94"));
    assert!(outbox[0].1.contains("maps?q=12.5,77.25"));
    assert_eq!(engine.recent_alerts(5).len(), 1);
}

#[test]
fn test_quiet_scene_is_low_and_history_is_bounded() {
    let sender = Arc::new(LogAlertSender::new());
    let (engine, clock) = engine_with(sender.clone(), vec![Contact::new("Bob", "+100")]);

    engine.ingest_audio(&wav_clip(0.1, 1.0)).unwrap();
    engine.ingest_frame(&png_frame(0, false, 10)).unwrap();
    engine.vision().process_pending();

    for _ in 0..7 {
        let report = engine.compute_risk(None);
        assert_eq!(report.assessment.threat_score, 0.08);
        assert_eq!(report.assessment.threat_level, ThreatLevel::Low);
        assert!(matches!(
            report.alert,
            GateOutcome::Skipped(SkipReason::NotHigh(ThreatLevel::Low))
        ));
        clock.advance_secs(1);
    }

    let recent = engine.recent_threats(5);
    assert_eq!(recent.len(), 5);
    assert!(recent[0].timestamp > recent[4].timestamp);
    assert!(sender.outbox().is_empty());
}

#[test]
fn test_stream_payload_retains_overlap() {
    let (engine, _clock) = engine_with(Arc::new(LogAlertSender::new()), Vec::new());

    let bytes: Vec<u8> = std::iter::repeat(0.05f32)
        .take(48000)
        .flat_map(|s| s.to_le_bytes())
        .collect();
    let ingest = engine.ingest_audio(&bytes).unwrap();
    assert_eq!(ingest, AudioIngest::Queued { samples: 48000 });

    assert_eq!(engine.audio().drain_and_classify(), 1);
    assert_eq!(engine.audio().buffered_samples(), 16000);
    assert_eq!(engine.get_status().audio.emotion, "neutral");
    assert!(engine.get_status().audio.active);
}

#[test]
fn test_bad_payloads_keep_previous_status() {
    let (engine, _clock) = engine_with(Arc::new(LogAlertSender::new()), Vec::new());
    engine.ingest_frame(&png_frame(2, false, 0)).unwrap();
    engine.vision().process_pending();
    let before = engine.get_status();

    assert!(matches!(
        engine.ingest_frame(b"\x89PNG broken"),
        Err(SentinelError::SensorDecode(_))
    ));
    assert!(matches!(
        engine.ingest_audio(&[1, 2, 3]),
        Err(SentinelError::SensorDecode(_))
    ));

    // 过短的片段不调用分类器
    let ingest = engine.ingest_audio(&wav_clip(0.8, 0.05)).unwrap();
    assert!(matches!(ingest, AudioIngest::Clip(ClipOutcome::TooShort { .. })));

    engine.vision().process_pending();
    assert_eq!(engine.get_status(), before);
}

#[test]
fn test_update_settings_merges_and_rejects() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSettingsStore::open(dir.path().join("alert.toml")).unwrap());
    let collaborators =
        Collaborators::new("alice", Arc::new(LoudnessClassifier), Arc::new(PixelDetector))
            .with_settings(store)
            .with_audit(Arc::new(InMemoryAuditLog::new(2)));
    let engine = SafetyEngine::new(SentinelConfig::default(), collaborators).unwrap();

    let updated = engine
        .update_settings(&AlertSettingsPatch {
            alert_cooldown_seconds: Some(120),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(updated.alert_cooldown_seconds, 120);
    assert!(updated.auto_emergency_enabled);

    let err = engine
        .update_settings(&AlertSettingsPatch {
            alert_cooldown_seconds: Some(-1),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, SentinelError::Configuration(_)));
    assert_eq!(engine.settings().alert_cooldown_seconds, 120);

    for _ in 0..3 {
        engine.compute_risk(None);
    }
    assert_eq!(engine.recent_threats(5).len(), 2);
}

#[test]
fn test_trigger_sos_bypasses_cooldown() {
    let sender = Arc::new(LogAlertSender::new());
    let (engine, clock) = engine_with(sender.clone(), vec![Contact::new("Bob", "+100")]);

    engine.ingest_audio(&wav_clip(0.8, 2.0)).unwrap();
    engine.ingest_frame(&png_frame(6, true, 0)).unwrap();
    engine.vision().process_pending();
    let context = Context::new(23, LocationType::Isolated).unwrap();
    assert!(engine.compute_risk(Some(context.clone())).alert.is_dispatched());

    clock.advance_secs(30);
    assert!(matches!(
        engine.compute_risk(Some(context)).alert,
        GateOutcome::Skipped(SkipReason::CoolingDown { .. })
    ));

    let sos = engine.trigger_sos(Some((1.5, 2.5)));
    assert!(sos.is_dispatched());
    assert_eq!(sender.outbox().len(), 2);
    assert_eq!(engine.recent_alerts(1)[0].status, "sos");
}

/// 打不开的摄像头
struct MissingCamera;

impl SensorSource for MissingCamera {
    type Item = Frame;

    fn name(&self) -> &str {
        "missing-camera"
    }

    fn open(&mut self) -> SentinelResult<()> {
        Err(SentinelError::DeviceUnavailable("/dev/video0 not found".to_string()))
    }

    fn read(&mut self) -> SentinelResult<Option<Frame>> {
        Ok(None)
    }

    fn close(&mut self) {}
}

#[test]
fn test_missing_device_degrades_and_workers_process_uploads() {
    let (engine, _clock) = engine_with(Arc::new(LogAlertSender::new()), Vec::new());

    let report = engine
        .start(Devices {
            microphone: None,
            camera: Some(Box::new(MissingCamera)),
        })
        .unwrap();
    assert!(!report.camera);
    assert!(report.degraded());
    assert!(engine.is_running());
    assert!(!engine.stats().vision.device_active);
    assert!(!engine.stats().audio.device_active);

    engine.ingest_frame(&png_frame(3, false, 0)).unwrap();

    let mut waited = 0;
    while engine.get_status().vision_version == 0 && waited < 200 {
        std::thread::sleep(Duration::from_millis(10));
        waited += 1;
    }
    assert_eq!(engine.get_status().vision.people_count, 3);

    engine.shutdown();
    engine.shutdown();
    assert!(!engine.is_running());
}
