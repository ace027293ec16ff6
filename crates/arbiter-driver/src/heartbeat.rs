//! 连接监视
//!
//! 记录最近一次收到有效数据包的时间，判断控制器是否仍在响应。
//! 时间以进程内单调时钟（相对首次调用）的微秒数存放在 `AtomicU64` 中，
//! 不受系统时钟调整影响，读写都无锁。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static APP_START: OnceLock<Instant> = OnceLock::new();

fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// 连接监视器
#[derive(Debug)]
pub struct ConnectionMonitor {
    last_packet: AtomicU64,
    // 0 表示尚未收到任何数据包
    packets_seen: AtomicU64,
    timeout: Duration,
}

impl ConnectionMonitor {
    /// # Example
    ///
    /// ```
    /// use arbiter_driver::ConnectionMonitor;
    /// use std::time::Duration;
    ///
    /// let monitor = ConnectionMonitor::new(Duration::from_secs(1));
    /// assert!(monitor.check_connection());
    /// ```
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_packet: AtomicU64::new(monotonic_micros()),
            packets_seen: AtomicU64::new(0),
            timeout,
        }
    }

    /// 超时窗口内收到过数据包（或刚创建）时返回 true
    pub fn check_connection(&self) -> bool {
        self.time_since_last_packet() < self.timeout
    }

    /// 读线程每收到一个有效数据包调用一次
    pub fn register_packet(&self) {
        self.last_packet.store(monotonic_micros(), Ordering::Relaxed);
        self.packets_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn time_since_last_packet(&self) -> Duration {
        let last_us = self.last_packet.load(Ordering::Relaxed);
        Duration::from_micros(monotonic_micros().saturating_sub(last_us))
    }

    /// 是否收到过任何数据包
    pub fn has_seen_packet(&self) -> bool {
        self.packets_seen.load(Ordering::Relaxed) > 0
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
