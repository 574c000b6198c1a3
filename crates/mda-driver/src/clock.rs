//! 时钟抽象
//!
//! 所有等待都经由 [`Clock`]，测试中用 [`ManualClock`] 替换，
//! 使保活泵和退避时序可观测而无需真实睡眠。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 单调时钟
pub trait Clock: Send + Sync {
    /// 自时钟创建以来经过的时间
    fn now(&self) -> Duration;

    /// 阻塞等待
    fn sleep(&self, duration: Duration);
}

/// 系统时钟（`spin_sleep` 提供亚毫秒级精度的睡眠）
#[derive(Debug, Clone)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

/// 手动时钟：`sleep` 只推进内部时间，不真正阻塞
///
/// 克隆后共享同一时间线，测试可以保留一份用于断言。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 手动推进时间
    pub fn advance(&self, duration: Duration) {
        self.nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// 累计经过的时间
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
