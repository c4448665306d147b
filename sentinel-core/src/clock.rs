//! 时钟抽象
//!
//! 状态时间戳与告警冷却都从这里取时间，测试中用 ManualClock 精确控制

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// 时间来源
pub trait Clock: Send + Sync {
    /// 当前时刻 (UTC)
    fn now(&self) -> DateTime<Utc>;
}

/// 系统墙上时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手动推进的时钟
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 前进指定秒数
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
