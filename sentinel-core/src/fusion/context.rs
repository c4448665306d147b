//! 环境上下文（时间 + 地点）

use crate::error::{SentinelError, SentinelResult};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 地点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Safe,
    Public,
    Isolated,
    Unknown,
}

impl LocationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Safe => "safe",
            LocationType::Public => "public",
            LocationType::Isolated => "isolated",
            LocationType::Unknown => "unknown",
        }
    }

    /// 偏僻或未知地点风险更高
    pub fn is_high_risk(&self) -> bool {
        matches!(self, LocationType::Isolated | LocationType::Unknown)
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocationType {
    type Err = SentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "safe" | "home" => Ok(LocationType::Safe),
            "public" => Ok(LocationType::Public),
            "isolated" => Ok(LocationType::Isolated),
            "unknown" => Ok(LocationType::Unknown),
            other => Err(SentinelError::Configuration(format!(
                "unknown location type '{}'",
                other
            ))),
        }
    }
}

/// 单次融合调用的上下文，由调用方提供，不做持久化
///
/// 反序列化经过 `Context::new` 的范围检查。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContext")]
pub struct Context {
    /// 0..=23
    pub hour_of_day: u8,
    pub location_type: LocationType,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
struct RawContext {
    hour_of_day: u8,
    location_type: LocationType,
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

impl TryFrom<RawContext> for Context {
    type Error = SentinelError;

    fn try_from(raw: RawContext) -> Result<Self, Self::Error> {
        let mut context = Context::new(raw.hour_of_day, raw.location_type)?;
        context.latitude = raw.latitude;
        context.longitude = raw.longitude;
        Ok(context)
    }
}

impl Context {
    pub fn new(hour_of_day: u8, location_type: LocationType) -> SentinelResult<Self> {
        if hour_of_day > 23 {
            return Err(SentinelError::Configuration(format!(
                "hour_of_day {} out of range 0..=23",
                hour_of_day
            )));
        }
        Ok(Self {
            hour_of_day,
            location_type,
            latitude: None,
            longitude: None,
        })
    }

    /// 使用本地当前时刻
    pub fn now(location_type: LocationType) -> Self {
        Self {
            hour_of_day: chrono::Local::now().hour() as u8,
            location_type,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_coordinates(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    /// 经纬度都存在时返回坐标
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }

    /// 夜间 (20:00–05:59) 风险更高
    pub fn is_night(&self) -> bool {
        self.hour_of_day >= 20 || self.hour_of_day <= 5
    }
}
