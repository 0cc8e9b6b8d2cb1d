//! 可注入的时钟
//!
//! 控制循环只通过 [`Clock`] 读时间和等待，测试中用 [`ManualClock`] 推进仿真时间，
//! 不依赖真实的 sleep。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// 单调时间（微秒）
    fn now_us(&self) -> u64;

    /// 等待 `duration`
    fn sleep(&self, duration: Duration);
}

/// 真实单调时钟，等待使用 spin_sleep 以获得微秒级精度
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep(&self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

/// 手动时钟：`sleep` 直接推进时间
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now_us
            .fetch_add(duration.as_micros() as u64, Ordering::AcqRel);
    }

    pub fn set_us(&self, now_us: u64) {
        self.now_us.store(now_us, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::Acquire)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        std::thread::yield_now();
    }
}
