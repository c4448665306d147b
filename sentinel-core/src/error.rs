use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentinelError {
    // 传感器数据错误
    #[error("Sensor payload decode failed: {0}")]
    SensorDecode(String),

    // 模型推理错误
    #[error("Model inference failed: {0}")]
    ModelInference(String),

    #[error("Model load failed: {path} - {reason}")]
    ModelLoad { path: String, reason: String },

    // 设备错误
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Capability unavailable: {0}")]
    CapabilityUnavailable(String),

    // 告警投递错误
    #[error("Alert delivery to {destination} failed: {reason}")]
    Delivery { destination: String, reason: String },

    // 配置错误
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Config parse error: {path} - {reason}")]
    ConfigParse { path: String, reason: String },

    // 其他错误
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SentinelError {
    /// 是否为设备不可用（进入降级模式而非失败）
    pub fn is_device_unavailable(&self) -> bool {
        matches!(self, SentinelError::DeviceUnavailable(_))
    }
}

pub type SentinelResult<T> = Result<T, SentinelError>;
