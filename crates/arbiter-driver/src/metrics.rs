//! 运行指标
//!
//! 读线程与控制周期线程更新原子计数器，任何线程都可以无锁读取快照。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动运行指标
///
/// # 使用示例
///
/// ```rust
/// use arbiter_driver::DriverMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = DriverMetrics::new();
/// metrics.packets_received.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().packets_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 收到的完整数据包数
    pub packets_received: AtomicU64,

    /// 被处理器认领（Consumed）的数据包数
    pub packets_dispatched: AtomicU64,

    /// 没有处理器认领的数据包数
    pub packets_unhandled: AtomicU64,

    /// 拆帧器丢弃的坏帧数（校验和 / 长度错误）
    pub transport_drops: AtomicU64,

    /// 接收超时次数（无数据时的正常现象）
    pub rx_timeouts: AtomicU64,

    /// 接收错误次数（IO 错误 / 断线）
    pub rx_errors: AtomicU64,

    /// 发出的数据包数
    pub packets_sent: AtomicU64,

    /// 发送失败次数
    pub tx_errors: AtomicU64,

    /// 已完成的控制周期数
    pub cycles: AtomicU64,

    /// 超时的控制周期数
    ///
    /// 持续增长说明行为或任务过慢，周期无法保持节奏。
    pub cycle_overruns: AtomicU64,

    /// 最近一个控制周期的耗时（微秒）
    pub last_cycle_us: AtomicU64,

    /// 行为故障次数
    pub behavior_faults: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_dispatched: self.packets_dispatched.load(Ordering::Relaxed),
            packets_unhandled: self.packets_unhandled.load(Ordering::Relaxed),
            transport_drops: self.transport_drops.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            rx_errors: self.rx_errors.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            cycles: self.cycles.load(Ordering::Relaxed),
            cycle_overruns: self.cycle_overruns.load(Ordering::Relaxed),
            last_cycle_us: self.last_cycle_us.load(Ordering::Relaxed),
            behavior_faults: self.behavior_faults.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.packets_received.store(0, Ordering::Relaxed);
        self.packets_dispatched.store(0, Ordering::Relaxed);
        self.packets_unhandled.store(0, Ordering::Relaxed);
        self.transport_drops.store(0, Ordering::Relaxed);
        self.rx_timeouts.store(0, Ordering::Relaxed);
        self.rx_errors.store(0, Ordering::Relaxed);
        self.packets_sent.store(0, Ordering::Relaxed);
        self.tx_errors.store(0, Ordering::Relaxed);
        self.cycles.store(0, Ordering::Relaxed);
        self.cycle_overruns.store(0, Ordering::Relaxed);
        self.last_cycle_us.store(0, Ordering::Relaxed);
        self.behavior_faults.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub packets_received: u64,
    pub packets_dispatched: u64,
    pub packets_unhandled: u64,
    pub transport_drops: u64,
    pub rx_timeouts: u64,
    pub rx_errors: u64,
    pub packets_sent: u64,
    pub tx_errors: u64,
    pub cycles: u64,
    pub cycle_overruns: u64,
    pub last_cycle_us: u64,
    pub behavior_faults: u64,
}

impl MetricsSnapshot {
    /// 被认领的数据包占比（百分比）
    ///
    /// 没有收到数据包时返回 0.0。
    pub fn dispatch_rate(&self) -> f64 {
        if self.packets_received == 0 {
            return 0.0;
        }
        (self.packets_dispatched as f64 / self.packets_received as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = DriverMetrics::new();
        metrics.packets_received.fetch_add(4, Ordering::Relaxed);
        metrics.packets_dispatched.fetch_add(3, Ordering::Relaxed);
        metrics.cycle_overruns.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.packets_received, 4);
        assert_eq!(snapshot.cycle_overruns, 1);
        assert_eq!(snapshot.dispatch_rate(), 75.0);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_dispatch_rate_empty() {
        assert_eq!(MetricsSnapshot::default().dispatch_rate(), 0.0);
    }
}
