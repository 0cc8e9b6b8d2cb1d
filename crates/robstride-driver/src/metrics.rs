//! 控制循环指标
//!
//! 原子计数器，`Ordering::Relaxed`；快照中不同计数器之间可能有微小的时间差。
//! 实测 tick 频率是指数加权移动平均，以 f64 位模式存放在 `AtomicU64` 中。

use std::sync::atomic::{AtomicU64, Ordering};

/// 频率 EWMA 中新样本的权重
const RATE_SMOOTHING: f64 = 0.1;

#[derive(Debug, Default)]
pub struct SupervisorMetrics {
    /// 已完成的 tick 数（所有 transport 合计）
    pub ticks: AtomicU64,
    /// 发送成功的帧数（运控帧 + 控制面帧）
    pub frames_sent: AtomicU64,
    /// 接收到的帧数
    pub frames_received: AtomicU64,
    /// 未发送就被新指令覆盖的运控指令数
    pub commands_coalesced: AtomicU64,
    /// 被安全限制拦下的运控指令数
    pub commands_dropped: AtomicU64,
    pub decode_errors: AtomicU64,
    pub send_errors: AtomicU64,
    pub recv_errors: AtomicU64,
    /// 来自未注册 ID 的帧
    pub unknown_frames: AtomicU64,
    /// Online -> Offline 次数
    pub offline_transitions: AtomicU64,
    /// 实测 tick 频率（Hz，`f64::to_bits`）
    update_rate_bits: AtomicU64,
}

impl SupervisorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录同一总线上相邻两个 tick 的间隔
    pub(crate) fn record_tick_interval(&self, interval_us: u64) {
        if interval_us == 0 {
            return;
        }
        let sample = 1_000_000.0 / interval_us as f64;
        let _ = self
            .update_rate_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                let previous = f64::from_bits(bits);
                let next = if previous == 0.0 {
                    sample
                } else {
                    previous * (1.0 - RATE_SMOOTHING) + sample * RATE_SMOOTHING
                };
                Some(next.to_bits())
            });
    }

    /// 实测 tick 频率（Hz），少于两个 tick 时为 0
    pub fn update_rate_hz(&self) -> f64 {
        f64::from_bits(self.update_rate_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            commands_coalesced: self.commands_coalesced.load(Ordering::Relaxed),
            commands_dropped: self.commands_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            recv_errors: self.recv_errors.load(Ordering::Relaxed),
            unknown_frames: self.unknown_frames.load(Ordering::Relaxed),
            offline_transitions: self.offline_transitions.load(Ordering::Relaxed),
            update_rate_hz: self.update_rate_hz(),
        }
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub commands_coalesced: u64,
    pub commands_dropped: u64,
    pub decode_errors: u64,
    pub send_errors: u64,
    pub recv_errors: u64,
    pub unknown_frames: u64,
    pub offline_transitions: u64,
    pub update_rate_hz: f64,
}

impl MetricsSnapshot {
    /// 解码失败率（百分比），没有收到帧时为 0
    pub fn decode_error_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.decode_errors as f64 / self.frames_received as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_metrics_default() {
        let snapshot = SupervisorMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
        assert_eq!(snapshot.decode_error_rate(), 0.0);
    }

    #[test]
    fn test_decode_error_rate() {
        let metrics = SupervisorMetrics::new();
        metrics.frames_received.fetch_add(8, Ordering::Relaxed);
        metrics.decode_errors.fetch_add(2, Ordering::Relaxed);
        assert_eq!(metrics.snapshot().decode_error_rate(), 25.0);
    }

    #[test]
    fn test_update_rate_ewma() {
        let metrics = SupervisorMetrics::new();
        assert_eq!(metrics.update_rate_hz(), 0.0);

        // 第一个样本直接作为初值
        metrics.record_tick_interval(10_000);
        assert!((metrics.update_rate_hz() - 100.0).abs() < 1e-9);

        metrics.record_tick_interval(20_000);
        assert!((metrics.update_rate_hz() - 95.0).abs() < 1e-9);

        metrics.record_tick_interval(0);
        assert!((metrics.snapshot().update_rate_hz - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_concurrent_increment() {
        let metrics = Arc::new(SupervisorMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        SupervisorMetrics::incr(&m.frames_sent);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.snapshot().frames_sent, 4000);
    }
}
