//! Sentinel 安全引擎
//!
//! 显式构造的服务对象，持有两路处理器、状态缓存、融合引擎与告警闸门。
//! 传输层在启动时构造它，关闭时调用 shutdown()。

use crate::alert::{
    AlertGate, AlertRecord, AlertSender, AlertSettings, AlertSettingsPatch, AuditLog,
    ContactDirectory, GateOutcome, InMemoryAuditLog, InMemorySettingsStore, LogAlertSender,
    SettingsStore, StaticContactDirectory, ThreatRecord,
};
use crate::audio::{
    decode_payload, AudioClassifier, AudioPayload, AudioStreamProcessor, AudioStreamStats,
    ClipOutcome,
};
use crate::capture::{AudioSource, FrameSource};
use crate::clock::{Clock, SystemClock};
use crate::config::SentinelConfig;
use crate::error::SentinelResult;
use crate::fusion::{Context, RiskAssessment, RiskFusionEngine};
use crate::status::{StatusSnapshot, StatusStore};
use crate::vision::{VisionDetector, VisionFrameProcessor, VisionStats};
use std::sync::Arc;

/// 融合结果中附带的历史条数
const RECENT_THREATS: usize = 5;

/// 引擎依赖的外部协作者
pub struct Collaborators {
    pub owner: String,
    pub classifier: Arc<dyn AudioClassifier>,
    pub detector: Arc<dyn VisionDetector>,
    pub sender: Arc<dyn AlertSender>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub audit: Arc<dyn AuditLog>,
    /// None 时使用内存存储，初始值取自配置
    pub settings: Option<Arc<dyn SettingsStore>>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// 只注入模型，其余使用内存实现
    pub fn new(
        owner: impl Into<String>,
        classifier: Arc<dyn AudioClassifier>,
        detector: Arc<dyn VisionDetector>,
    ) -> Self {
        Self {
            owner: owner.into(),
            classifier,
            detector,
            sender: Arc::new(LogAlertSender::new()),
            contacts: Arc::new(StaticContactDirectory::new()),
            audit: Arc::new(InMemoryAuditLog::default()),
            settings: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn AlertSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_contacts(mut self, contacts: Arc<dyn ContactDirectory>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// 启动时要打开的设备
#[derive(Default)]
pub struct Devices {
    pub microphone: Option<AudioSource>,
    pub camera: Option<FrameSource>,
}

/// 启动结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartReport {
    /// 麦克风已打开
    pub microphone: bool,
    /// 摄像头已打开
    pub camera: bool,
}

impl StartReport {
    /// 至少一路没有设备，只处理上传的数据
    pub fn degraded(&self) -> bool {
        !self.microphone || !self.camera
    }
}

/// 音频上传的处理方式
#[derive(Debug, Clone, PartialEq)]
pub enum AudioIngest {
    /// WAV 片段，已同步分类
    Clip(ClipOutcome),
    /// 原始 PCM，已排入流式队列
    Queued { samples: usize },
}

/// 两路处理器的运行统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    pub audio: AudioStreamStats,
    pub vision: VisionStats,
}

/// 一次 compute_risk 的完整结果
#[derive(Debug, Clone)]
pub struct ThreatReport {
    pub assessment: RiskAssessment,
    pub alert: GateOutcome,
    /// 最近的威胁记录（含本次），最新的在前
    pub recent: Vec<ThreatRecord>,
}

/// 安全引擎
pub struct SafetyEngine {
    store: Arc<StatusStore>,
    audio: AudioStreamProcessor,
    vision: VisionFrameProcessor,
    fusion: RiskFusionEngine,
    gate: AlertGate,
    settings: Arc<dyn SettingsStore>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
}

impl SafetyEngine {
    pub fn new(config: SentinelConfig, collaborators: Collaborators) -> SentinelResult<Self> {
        config.validate()?;

        let Collaborators {
            owner,
            classifier,
            detector,
            sender,
            contacts,
            audit,
            settings,
            clock,
        } = collaborators;

        let store = Arc::new(StatusStore::new());
        let audio =
            AudioStreamProcessor::new(config.audio, classifier, store.clone(), clock.clone())?;
        let vision =
            VisionFrameProcessor::new(config.vision, detector, store.clone(), clock.clone())?;
        let fusion = RiskFusionEngine::new(config.fusion)?;
        let settings = match settings {
            Some(settings) => settings,
            None => Arc::new(InMemorySettingsStore::new(config.alert.clone())) as Arc<dyn SettingsStore>,
        };
        let gate = AlertGate::new(owner, sender, contacts, audit.clone());

        tracing::info!("✅ Sentinel 引擎已创建: {}", gate.owner());

        Ok(Self {
            store,
            audio,
            vision,
            fusion,
            gate,
            settings,
            audit,
            clock,
        })
    }

    /// 启动两路处理循环
    ///
    /// 设备不可用时该路进入降级模式：处理循环照常运行，只处理上传的数据。
    pub fn start(&self, devices: Devices) -> SentinelResult<StartReport> {
        let mut report = StartReport::default();

        let has_mic = devices.microphone.is_some();
        match self.audio.start(devices.microphone) {
            Ok(_) => report.microphone = has_mic,
            Err(e) if e.is_device_unavailable() => {
                tracing::warn!("⚠️ 麦克风不可用，音频进入降级模式: {}", e);
                self.audio.start(None)?;
            }
            Err(e) => return Err(e),
        }

        let has_camera = devices.camera.is_some();
        match self.vision.start(devices.camera) {
            Ok(_) => report.camera = has_camera,
            Err(e) if e.is_device_unavailable() => {
                tracing::warn!("⚠️ 摄像头不可用，视觉进入降级模式: {}", e);
                self.vision.start(None)?;
            }
            Err(e) => {
                self.audio.stop();
                return Err(e);
            }
        }

        tracing::info!(
            "✅ Sentinel 引擎已启动 (麦克风: {}, 摄像头: {})",
            report.microphone,
            report.camera
        );
        Ok(report)
    }

    /// 停止两路处理并释放设备；可重复调用
    pub fn shutdown(&self) {
        self.audio.stop();
        self.vision.stop();
    }

    pub fn is_running(&self) -> bool {
        self.audio.is_running() || self.vision.is_running()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            audio: self.audio.stats(),
            vision: self.vision.stats(),
        }
    }

    /// 上传音频：WAV 片段走批量分类，原始 f32le 进入流式队列
    pub fn ingest_audio(&self, bytes: &[u8]) -> SentinelResult<AudioIngest> {
        match decode_payload(bytes, self.audio.config().sample_rate)? {
            AudioPayload::Clip(samples) => self.audio.classify_clip(&samples).map(AudioIngest::Clip),
            AudioPayload::Chunk(samples) => {
                self.audio.ingest(&samples);
                Ok(AudioIngest::Queued {
                    samples: samples.len(),
                })
            }
        }
    }

    /// 上传一帧编码图像
    pub fn ingest_frame(&self, bytes: &[u8]) -> SentinelResult<()> {
        self.vision.ingest(bytes)
    }

    /// 当前状态快照
    pub fn get_status(&self) -> StatusSnapshot {
        self.store.snapshot()
    }

    /// 用当前状态做一次融合 + 告警判定，并记录结果
    pub fn compute_risk(&self, context: Option<Context>) -> ThreatReport {
        let snapshot = self.store.snapshot();
        let assessment = self.fusion.compute_snapshot(&snapshot, context.as_ref());
        let now = self.clock.now();
        let coordinates = context.as_ref().and_then(Context::coordinates);

        tracing::debug!(
            "融合结果: 视觉 {:.2}, 音频 {:.2}, 环境 {:.2} → {:.2} {}",
            assessment.vision_risk,
            assessment.audio_risk,
            assessment.context_risk,
            assessment.threat_score,
            assessment.threat_level
        );

        let record = ThreatRecord {
            timestamp: now,
            vision_risk: assessment.vision_risk,
            audio_risk: assessment.audio_risk,
            context_risk: assessment.context_risk,
            threat_score: assessment.threat_score,
            threat_level: assessment.threat_level,
            location_type: context.as_ref().map(|c| c.location_type),
            latitude: context.as_ref().and_then(|c| c.latitude),
            longitude: context.as_ref().and_then(|c| c.longitude),
        };
        if let Err(e) = self.audit.append_threat(record) {
            tracing::warn!("⚠️ 威胁记录写入失败: {}", e);
        }

        let settings = self.settings.get();
        let alert = self.gate.evaluate(&assessment, &settings, coordinates, now);

        ThreatReport {
            assessment,
            alert,
            recent: self.audit.recent(RECENT_THREATS),
        }
    }

    /// 用户手动求救：跳过自动告警的所有判定，立即通知所有联系人
    pub fn trigger_sos(&self, coordinates: Option<(f64, f64)>) -> GateOutcome {
        self.gate.dispatch_manual(coordinates, self.clock.now())
    }

    /// 合并告警设置；非法值被拒绝，原设置保留
    pub fn update_settings(&self, patch: &AlertSettingsPatch) -> SentinelResult<AlertSettings> {
        self.settings.update(patch)
    }

    pub fn settings(&self) -> AlertSettings {
        self.settings.get()
    }

    pub fn recent_threats(&self, n: usize) -> Vec<ThreatRecord> {
        self.audit.recent(n)
    }

    pub fn recent_alerts(&self, n: usize) -> Vec<AlertRecord> {
        self.audit.recent_alerts(n)
    }

    pub fn audio(&self) -> &AudioStreamProcessor {
        &self.audio
    }

    pub fn vision(&self) -> &VisionFrameProcessor {
        &self.vision
    }

    pub fn gate(&self) -> &AlertGate {
        &self.gate
    }
}

impl Drop for SafetyEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
