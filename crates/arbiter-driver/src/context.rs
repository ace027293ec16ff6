//! 共享上下文
//!
//! 读线程、控制周期线程与应用线程共享的全部状态。
//!
//! 加锁顺序：`state` → `tasks` → `arbitration` → `transmitter`；
//! `handlers` 只在持有 `state` 时以读锁获取。

use crate::builtin::install_default_handlers;
use crate::config::RobotConfig;
use crate::cycle::TaskRegistry;
use crate::error::DriverError;
use crate::handlers::HandlerRegistry;
use crate::heartbeat::ConnectionMonitor;
use crate::metrics::DriverMetrics;
use crate::mode::{AtomicCycleStatus, CycleStatus};
use crate::state::RobotState;
use arbiter_action::{BehaviorSet, KinematicLimits, MotionCommand, Resolver};
use arbiter_link::{PacketSender, TxLink};
use arbiter_protocol::Packet;
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub(crate) type Transmitter = PacketSender<Box<dyn TxLink>>;

/// 行为集合与仲裁器
pub(crate) struct Arbitration {
    pub(crate) behaviors: BehaviorSet,
    pub(crate) resolver: Resolver,
}

pub(crate) struct RobotContext {
    /// 机器人状态（控制周期整周期持有）
    pub(crate) state: Mutex<RobotState>,
    pub(crate) tasks: Mutex<TaskRegistry>,
    pub(crate) arbitration: Mutex<Arbitration>,
    pub(crate) handlers: RwLock<HandlerRegistry>,
    transmitter: Mutex<Option<Transmitter>>,
    /// 最近一次仲裁后的运动指令（无锁读取）
    pub(crate) command: ArcSwap<MotionCommand>,
    pub(crate) limits: KinematicLimits,
    pub(crate) status: AtomicCycleStatus,
    /// 为真时不把仲裁结果反映到运动命令上
    pub(crate) direct_motion: AtomicBool,
    /// 链路已断开或已关闭
    pub(crate) disconnected: AtomicBool,
    pub(crate) metrics: DriverMetrics,
    pub(crate) monitor: ConnectionMonitor,
    stop_lock: Mutex<()>,
    stop_cond: Condvar,
    wake_tx: Sender<()>,
    pub(crate) wake_rx: Receiver<()>,
}

impl RobotContext {
    pub(crate) fn new(config: &RobotConfig, transmitter: Transmitter) -> Result<Self, DriverError> {
        let mut handlers = HandlerRegistry::new();
        if config.install_default_handlers {
            install_default_handlers(&mut handlers)?;
        }
        let (wake_tx, wake_rx) = bounded(1);

        Ok(Self {
            state: Mutex::new(RobotState::new()),
            tasks: Mutex::new(TaskRegistry::with_builtin_tasks()),
            arbitration: Mutex::new(Arbitration {
                behaviors: BehaviorSet::new(),
                resolver: Resolver::new(config.resolve_mode),
            }),
            handlers: RwLock::new(handlers),
            transmitter: Mutex::new(Some(transmitter)),
            command: ArcSwap::from_pointee(MotionCommand::new(&config.limits)),
            limits: config.limits,
            status: AtomicCycleStatus::new(CycleStatus::Stopped),
            direct_motion: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            metrics: DriverMetrics::new(),
            monitor: ConnectionMonitor::new(Duration::from_millis(config.connection_timeout_ms)),
            stop_lock: Mutex::new(()),
            stop_cond: Condvar::new(),
            wake_tx,
            wake_rx,
        })
    }

    /// 一次写出一批数据包
    pub(crate) fn send(&self, packets: &[Packet]) -> Result<(), DriverError> {
        let mut transmitter = self.transmitter.lock();
        let Some(sender) = transmitter.as_mut() else {
            return Err(DriverError::Disconnected);
        };
        match sender.send_batch(packets) {
            Ok(()) => {
                self.metrics
                    .packets_sent
                    .fetch_add(packets.len() as u64, Ordering::Relaxed);
                Ok(())
            },
            Err(e) => {
                self.metrics.tx_errors.fetch_add(1, Ordering::Relaxed);
                Err(e.into())
            },
        }
    }

    /// 关闭发送端，同时解除读线程的阻塞
    pub(crate) fn close_transmitter(&self) {
        if let Some(mut sender) = self.transmitter.lock().take() {
            debug!("Closing link ({} packets sent)", sender.packets_sent());
            sender.close();
        }
        self.disconnected.store(true, Ordering::Release);
    }

    /// Stopped → Running
    pub(crate) fn begin_run(&self) -> Result<(), DriverError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(DriverError::Disconnected);
        }
        self.status
            .compare_exchange(
                CycleStatus::Stopped,
                CycleStatus::Running,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| DriverError::AlreadyRunning)?;
        // 丢弃上一次运行残留的唤醒信号
        while self.wake_rx.try_recv().is_ok() {}
        Ok(())
    }

    /// Running → Stopping，并唤醒正在休眠的控制周期
    ///
    /// 返回是否确实发出了停止请求。
    pub(crate) fn request_stop(&self) -> bool {
        let requested = self
            .status
            .compare_exchange(
                CycleStatus::Running,
                CycleStatus::Stopping,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if requested {
            let _ = self.wake_tx.try_send(());
        }
        requested
    }

    /// 控制周期退出：→ Stopped，释放所有等待者
    pub(crate) fn finish_stop(&self) {
        {
            let _guard = self.stop_lock.lock();
            self.status.set(CycleStatus::Stopped, Ordering::Release);
        }
        self.stop_cond.notify_all();
    }

    /// 等待控制周期进入 Stopped
    ///
    /// `timeout` 为 `None` 时一直等待；超时返回 false。
    pub(crate) fn wait_for_stop(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut guard = self.stop_lock.lock();
        while self.status.get(Ordering::Acquire) != CycleStatus::Stopped {
            match deadline {
                Some(deadline) => {
                    if self.stop_cond.wait_until(&mut guard, deadline).timed_out() {
                        let stopped = self.status.get(Ordering::Acquire) == CycleStatus::Stopped;
                        if !stopped {
                            warn!("Timed out waiting for control cycle to stop");
                        }
                        return stopped;
                    }
                },
                None => self.stop_cond.wait(&mut guard),
            }
        }
        true
    }
}
