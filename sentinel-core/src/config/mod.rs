//! Sentinel 配置模块
//!
//! 统一的配置管理，从 ~/.config/sentinel/config.toml 加载

use crate::alert::AlertSettings;
use crate::audio::AudioStreamConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::fusion::FusionWeights;
use crate::vision::VisionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Sentinel 完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// 音频流配置
    #[serde(default)]
    pub audio: AudioStreamConfig,
    /// 视觉配置
    #[serde(default)]
    pub vision: VisionConfig,
    /// 融合权重
    #[serde(default)]
    pub fusion: FusionWeights,
    /// 告警设置（初始值，运行期由 SettingsStore 持有）
    #[serde(default)]
    pub alert: AlertSettings,
}

impl SentinelConfig {
    /// 加载默认位置的配置文件，不存在时使用默认配置
    pub fn load() -> SentinelResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            tracing::info!("配置文件不存在，使用默认配置: {:?}", config_path);
            return Ok(Self::default());
        }

        Self::load_from(&config_path)
    }

    /// 从指定路径加载配置
    pub fn load_from(path: &Path) -> SentinelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| SentinelError::ConfigParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;

        tracing::info!("📋 加载配置成功: {:?}", path);
        tracing::info!(
            "📊 音频窗口: {}s / 重叠 {}s, 接受阈值 {}",
            config.audio.window_secs,
            config.audio.overlap_secs,
            config.audio.acceptance_threshold
        );
        Ok(config)
    }

    /// 保存到默认位置
    pub fn save(&self) -> SentinelResult<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// 保存到指定路径
    pub fn save_to(&self, path: &Path) -> SentinelResult<()> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| SentinelError::ConfigParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, content)?;

        tracing::info!("保存配置成功: {:?}", path);
        Ok(())
    }

    /// 校验所有子配置
    pub fn validate(&self) -> SentinelResult<()> {
        self.audio.validate()?;
        self.vision.validate()?;
        self.fusion.validate()?;
        self.alert.validate()?;
        Ok(())
    }

    /// 获取配置文件路径
    ///
    /// SENTINEL_CONFIG 环境变量优先
    pub fn config_path() -> SentinelResult<PathBuf> {
        if let Ok(path) = std::env::var("SENTINEL_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .ok_or_else(|| SentinelError::Configuration("无法获取配置目录".to_string()))?;

        Ok(config_dir.join("sentinel").join("config.toml"))
    }
}
