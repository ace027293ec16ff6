//! 读线程
//!
//! 专门负责接收数据包并分发给处理器。阻塞等待链路时不持有状态锁，
//! 收到完整数据包后才短暂加锁分发，更新在下一个控制周期加锁时可见。

use crate::context::RobotContext;
use crate::handlers::DispatchOutcome;
use arbiter_link::{LinkError, PacketReceiver, RxLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// 读线程配置
///
/// # Example
///
/// ```
/// use arbiter_driver::ReaderConfig;
///
/// let config = ReaderConfig {
///     receive_timeout_ms: 10,
///     stop_on_disconnect: false,
///     ..Default::default()
/// };
/// assert_eq!(config.retry_backoff_ms, 50);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderConfig {
    /// 单次接收超时（毫秒）
    pub receive_timeout_ms: u64,
    /// 接收出错后的退避时间（毫秒）
    pub retry_backoff_ms: u64,
    /// 连接断开时停止控制周期并退出读线程
    pub stop_on_disconnect: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 20,
            retry_backoff_ms: 50,
            stop_on_disconnect: true,
        }
    }
}

/// 读线程主循环
///
/// # 参数
/// - `rx`: 数据包接收端
/// - `ctx`: 共享上下文
/// - `config`: 读线程配置
/// - `is_running`: 运行标志（清除后在下一次接收超时时退出）
pub(crate) fn reader_loop<R: RxLink>(
    mut rx: PacketReceiver<R>,
    ctx: Arc<RobotContext>,
    config: ReaderConfig,
    is_running: Arc<AtomicBool>,
) {
    let timeout = Duration::from_millis(config.receive_timeout_ms);
    let backoff = Duration::from_millis(config.retry_backoff_ms);
    let mut reported_drops = 0u64;

    loop {
        // Acquire: 看到 false 时必须同时看到关闭方的全部写入
        if !is_running.load(Ordering::Acquire) {
            trace!("Reader thread: is_running flag is false, exiting");
            break;
        }

        let result = rx.receive(timeout);

        let drops = rx.stats().dropped();
        if drops != reported_drops {
            debug!("Deframer dropped {} malformed frame(s)", drops - reported_drops);
            reported_drops = drops;
            ctx.metrics.transport_drops.store(drops, Ordering::Relaxed);
        }

        let packet = match result {
            Ok(packet) => {
                ctx.metrics.packets_received.fetch_add(1, Ordering::Relaxed);
                packet
            },
            Err(LinkError::Timeout) => {
                ctx.metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                // 主动关闭链路导致的错误不算故障
                if !is_running.load(Ordering::Acquire) {
                    trace!("Reader thread: link closed during shutdown ({})", e);
                    break;
                }

                ctx.metrics.rx_errors.fetch_add(1, Ordering::Relaxed);

                if e.is_connection_failure() {
                    error!("Reader thread: connection lost: {}", e);
                    ctx.state.lock().connected = false;

                    if config.stop_on_disconnect {
                        warn!("Reader thread: stop_on_disconnect is set, stopping control cycle");
                        ctx.disconnected.store(true, Ordering::Release);
                        ctx.request_stop();
                        // Release: 其他线程看到 false 时也能看到上面的写入
                        is_running.store(false, Ordering::Release);
                        break;
                    }
                } else {
                    warn!("Reader thread: receive error: {}", e);
                }

                spin_sleep::sleep(backoff);
                continue;
            },
        };

        ctx.monitor.register_packet();

        let outcome = {
            let mut state = ctx.state.lock();
            state.connected = true;
            ctx.handlers.read().dispatch(&packet, &mut state)
        };

        match outcome {
            DispatchOutcome::Consumed => {
                ctx.metrics.packets_dispatched.fetch_add(1, Ordering::Relaxed);
            },
            DispatchOutcome::Unhandled => {
                ctx.metrics.packets_unhandled.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Discarding unhandled packet {:#04x} ({} bytes payload)",
                    packet.id(),
                    packet.payload().len()
                );
            },
        }
    }

    debug!("Reader thread exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RobotConfig;
    use crate::handlers::{HandlerOutcome, PacketClass};
    use crate::mode::CycleStatus;
    use crate::state::RobotState;
    use arbiter_link::{MockLink, MockRemote, PacketSender, SplittableLink, TxLink};
    use arbiter_protocol::{Packet, StatusPacket};
    use std::thread::{self, JoinHandle};
    use std::time::Instant;

    fn spawn_reader(
        config: ReaderConfig,
    ) -> (Arc<RobotContext>, MockRemote, Arc<AtomicBool>, JoinHandle<()>) {
        let (link, remote) = MockLink::pair();
        let (rx, tx) = link.split().unwrap();
        let sender = PacketSender::new(Box::new(tx) as Box<dyn TxLink>);
        let ctx = Arc::new(RobotContext::new(&RobotConfig::default(), sender).unwrap());
        let running = Arc::new(AtomicBool::new(true));

        let handle = {
            let ctx = ctx.clone();
            let running = running.clone();
            thread::spawn(move || reader_loop(PacketReceiver::new(rx), ctx, config, running))
        };
        (ctx, remote, running, handle)
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_status_packet_updates_state() {
        let (ctx, remote, running, handle) = spawn_reader(ReaderConfig::default());

        let status = StatusPacket {
            x_mm: 500.0,
            heading_deg: 30.0,
            ..Default::default()
        };
        remote.send_packet(&status.encode());

        assert!(wait_until(|| ctx.state.lock().status_packets == 1));
        {
            let state = ctx.state.lock();
            assert_eq!(state.x, 500.0);
            assert_eq!(state.heading, 30.0);
            assert!(state.connected);
        }
        assert!(ctx.monitor.has_seen_packet());

        running.store(false, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(ctx.metrics.packets_dispatched.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unhandled_packet_counted() {
        let (ctx, remote, running, handle) = spawn_reader(ReaderConfig::default());
        remote.send_packet(&Packet::empty(0x70));

        assert!(wait_until(|| {
            ctx.metrics.packets_unhandled.load(Ordering::Relaxed) == 1
        }));

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_malformed_then_valid() {
        let (ctx, remote, running, handle) = spawn_reader(ReaderConfig::default());
        let seen = Arc::new(AtomicBool::new(false));
        {
            let seen = seen.clone();
            ctx.handlers.write().add(
                PacketClass::Id(0x71),
                move |_: &Packet, _: &mut RobotState| {
                    seen.store(true, Ordering::SeqCst);
                    HandlerOutcome::Consumed
                },
            );
        }

        let mut bad = Packet::new(0x71, vec![1u8, 2, 3]).unwrap().encode().to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0xFF;
        remote.send_bytes(&bad);
        remote.send_packet(&Packet::new(0x71, vec![4u8]).unwrap());

        assert!(wait_until(|| seen.load(Ordering::SeqCst)));
        assert!(wait_until(|| {
            ctx.metrics.transport_drops.load(Ordering::Relaxed) == 1
        }));
        assert_eq!(ctx.metrics.packets_dispatched.load(Ordering::Relaxed), 1);

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_disconnect_stops_cycle() {
        let (ctx, mut remote, running, handle) = spawn_reader(ReaderConfig::default());
        ctx.begin_run().unwrap();

        remote.disconnect();
        handle.join().unwrap();

        assert!(!running.load(Ordering::Acquire));
        assert!(!ctx.state.lock().connected);
        assert_eq!(ctx.status.get(Ordering::Acquire), CycleStatus::Stopping);
        assert_eq!(ctx.metrics.rx_errors.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_disconnect_without_stop_keeps_retrying() {
        let config = ReaderConfig {
            retry_backoff_ms: 1,
            stop_on_disconnect: false,
            ..Default::default()
        };
        let (ctx, mut remote, running, handle) = spawn_reader(config);

        remote.disconnect();
        assert!(wait_until(|| ctx.metrics.rx_errors.load(Ordering::Relaxed) >= 2));
        assert!(running.load(Ordering::Acquire));
        assert!(!ctx.state.lock().connected);

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }
}
