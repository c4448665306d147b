//! 告警设置与持久化

use crate::error::{SentinelError, SentinelResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 自动告警设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// 是否自动发送紧急告警
    pub auto_emergency_enabled: bool,
    /// 触发告警的最低威胁分数
    pub threat_threshold: f64,
    /// 两次告警之间的最短间隔 (秒)
    pub alert_cooldown_seconds: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            auto_emergency_enabled: true,
            threat_threshold: 0.7,
            alert_cooldown_seconds: 300,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> SentinelResult<()> {
        if !(0.0..=1.0).contains(&self.threat_threshold) {
            return Err(SentinelError::Configuration(format!(
                "alert.threat_threshold ({}) must be in [0, 1]",
                self.threat_threshold
            )));
        }
        Ok(())
    }

    /// 合并补丁，返回新设置；原设置不变
    pub fn merged(&self, patch: &AlertSettingsPatch) -> SentinelResult<Self> {
        let mut next = self.clone();

        if let Some(enabled) = patch.auto_emergency_enabled {
            next.auto_emergency_enabled = enabled;
        }
        if let Some(threshold) = patch.threat_threshold {
            next.threat_threshold = threshold;
        }
        if let Some(cooldown) = patch.alert_cooldown_seconds {
            next.alert_cooldown_seconds = u64::try_from(cooldown).map_err(|_| {
                SentinelError::Configuration(format!(
                    "alert_cooldown_seconds ({}) must not be negative",
                    cooldown
                ))
            })?;
        }

        next.validate()?;
        Ok(next)
    }
}

/// 部分更新：只有给出的字段会被合并
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettingsPatch {
    pub auto_emergency_enabled: Option<bool>,
    pub threat_threshold: Option<f64>,
    /// 有符号，以便在边界上拒绝负值
    pub alert_cooldown_seconds: Option<i64>,
}

impl AlertSettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.auto_emergency_enabled.is_none()
            && self.threat_threshold.is_none()
            && self.alert_cooldown_seconds.is_none()
    }
}

/// 告警设置存储
pub trait SettingsStore: Send + Sync {
    fn get(&self) -> AlertSettings;

    /// 合并补丁；校验失败时保留原设置并返回 `Configuration`
    fn update(&self, patch: &AlertSettingsPatch) -> SentinelResult<AlertSettings>;
}

/// 内存中的设置存储
#[derive(Debug, Default)]
pub struct InMemorySettingsStore {
    settings: RwLock<AlertSettings>,
}

impl InMemorySettingsStore {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }
}

impl SettingsStore for InMemorySettingsStore {
    fn get(&self) -> AlertSettings {
        self.settings.read().clone()
    }

    fn update(&self, patch: &AlertSettingsPatch) -> SentinelResult<AlertSettings> {
        let mut settings = self.settings.write();
        let next = settings.merged(patch)?;
        *settings = next.clone();
        tracing::info!("告警设置已更新: {:?}", next);
        Ok(next)
    }
}

/// TOML 文件中的设置存储
#[derive(Debug)]
pub struct FileSettingsStore {
    path: PathBuf,
    settings: RwLock<AlertSettings>,
}

impl FileSettingsStore {
    /// 打开设置文件，不存在时使用默认设置（首次更新时写入）
    pub fn open(path: impl AsRef<Path>) -> SentinelResult<Self> {
        let path = path.as_ref().to_path_buf();

        let settings = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let settings: AlertSettings =
                toml::from_str(&content).map_err(|e| SentinelError::ConfigParse {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
            settings.validate()?;
            tracing::info!("📋 加载告警设置: {:?}", path);
            settings
        } else {
            tracing::info!("告警设置文件不存在，使用默认设置: {:?}", path);
            AlertSettings::default()
        };

        Ok(Self {
            path,
            settings: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, settings: &AlertSettings) -> SentinelResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(settings).map_err(|e| SentinelError::ConfigParse {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self) -> AlertSettings {
        self.settings.read().clone()
    }

    fn update(&self, patch: &AlertSettingsPatch) -> SentinelResult<AlertSettings> {
        let mut settings = self.settings.write();
        let next = settings.merged(patch)?;
        self.persist(&next)?;
        *settings = next.clone();
        tracing::info!("告警设置已保存: {:?}", self.path);
        Ok(next)
    }
}
