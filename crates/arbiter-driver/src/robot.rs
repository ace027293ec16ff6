//! Robot 对外 API
//!
//! 持有读线程与控制周期线程，提供行为、周期任务、数据包处理器的注册，
//! 以及原始命令发送和状态访问。

use crate::config::RobotConfig;
use crate::context::RobotContext;
use crate::cycle::{CycleConfig, CycleTask, TaskHandle, cycle_loop};
use crate::error::DriverError;
use crate::handlers::{HandlerHandle, PacketClass, PacketHandler};
use crate::metrics::MetricsSnapshot;
use crate::mode::CycleStatus;
use crate::pipeline::reader_loop;
use crate::state::RobotState;
use arbiter_action::{
    Behavior, BehaviorHandle, BehaviorInfo, DesireSet, MotionCommand, ResolveMode, RobotSnapshot,
};
use arbiter_link::{PacketReceiver, PacketSender, SplittableLink, TxLink};
use arbiter_protocol::{self as protocol, Packet};
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的 JoinHandle::join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> std::thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责 join，超时后任其自行结束
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

struct Session {
    cycle_thread: Option<JoinHandle<()>>,
    reader_thread: Option<JoinHandle<()>>,
}

/// 状态锁守卫，drop 时释放
///
/// 持有期间控制周期与读线程都会阻塞，应尽快释放。
/// 同一线程重复调用 [`Robot::lock`] 会死锁。
pub struct RobotGuard<'a> {
    guard: MutexGuard<'a, RobotState>,
}

impl Deref for RobotGuard<'_> {
    type Target = RobotState;

    fn deref(&self) -> &RobotState {
        &self.guard
    }
}

impl DerefMut for RobotGuard<'_> {
    fn deref_mut(&mut self) -> &mut RobotState {
        &mut self.guard
    }
}

/// 机器人驱动（对外 API）
///
/// 创建时启动读线程；控制周期由 [`Robot::run`] / [`Robot::run_async`] 启动。
/// drop 时停止控制周期、关闭链路并等待两个线程退出。
///
/// 行为的 `fire`、周期任务和数据包处理器都在内部锁之内执行，
/// 不能在其中回调 `Robot` 的注册类方法。
pub struct Robot {
    ctx: Arc<RobotContext>,
    cycle_config: CycleConfig,
    session: Mutex<Session>,
    reader_running: Arc<AtomicBool>,
}

impl Robot {
    /// 在链路上创建驱动并启动读线程
    pub fn new<L: SplittableLink>(link: L, config: RobotConfig) -> Result<Self, DriverError> {
        let (rx, tx) = link.split()?;
        let transmitter = PacketSender::new(Box::new(tx) as Box<dyn TxLink>);
        let ctx = Arc::new(RobotContext::new(&config, transmitter)?);
        ctx.state.lock().connected = true;

        let reader_running = Arc::new(AtomicBool::new(true));
        let reader_thread = {
            let ctx = ctx.clone();
            let running = reader_running.clone();
            let reader_config = config.reader.clone();
            std::thread::Builder::new()
                .name("arbiter-reader".into())
                .spawn(move || {
                    reader_loop(PacketReceiver::new(rx), ctx, reader_config, running);
                })
                .map_err(|e| DriverError::Thread(e.to_string()))?
        };

        info!("Robot driver started (period {} ms)", config.cycle.period_ms);

        Ok(Self {
            ctx,
            cycle_config: config.cycle,
            session: Mutex::new(Session {
                cycle_thread: None,
                reader_thread: Some(reader_thread),
            }),
            reader_running,
        })
    }

    // ------------------------------------------------------------------
    // 控制周期
    // ------------------------------------------------------------------

    /// 启动控制周期：`run_async` 为 true 时在后台线程运行，否则阻塞在当前线程
    pub fn start(&self, run_async: bool) -> Result<(), DriverError> {
        if run_async {
            self.run_async()
        } else {
            self.run()
        }
    }

    /// 在当前线程运行控制周期，直到停止
    pub fn run(&self) -> Result<(), DriverError> {
        {
            let _session = self.session.lock();
            self.ctx.begin_run()?;
        }
        cycle_loop(&self.ctx, &self.cycle_config);
        Ok(())
    }

    /// 在后台线程运行控制周期
    pub fn run_async(&self) -> Result<(), DriverError> {
        let mut session = self.session.lock();
        self.ctx.begin_run()?;

        // 上一次运行的线程已经结束
        if let Some(old) = session.cycle_thread.take()
            && let Err(_e) = old.join_timeout(JOIN_TIMEOUT)
        {
            warn!("Previous control cycle thread did not shut down cleanly");
        }

        let ctx = self.ctx.clone();
        let config = self.cycle_config.clone();
        let handle = std::thread::Builder::new()
            .name("arbiter-cycle".into())
            .spawn(move || cycle_loop(&ctx, &config));

        match handle {
            Ok(handle) => {
                session.cycle_thread = Some(handle);
                Ok(())
            },
            Err(e) => {
                self.ctx.finish_stop();
                Err(DriverError::Thread(e.to_string()))
            },
        }
    }

    /// 请求停止控制周期（当前周期执行完后退出）
    ///
    /// 控制周期未运行时返回 false。
    pub fn stop(&self) -> bool {
        let requested = self.ctx.request_stop();
        if requested {
            debug!("Control cycle stop requested");
        }
        requested
    }

    /// 阻塞直到控制周期停止
    ///
    /// `timeout` 为 `None` 时一直等待；超时返回 false。
    pub fn wait_for_stop(&self, timeout: Option<Duration>) -> bool {
        self.ctx.wait_for_stop(timeout)
    }

    /// 请求停止并等待控制周期退出
    pub fn stop_and_wait(&self, timeout: Duration) -> Result<(), DriverError> {
        if !self.stop() {
            return Err(DriverError::NotRunning);
        }
        if self.wait_for_stop(Some(timeout)) {
            Ok(())
        } else {
            Err(DriverError::Timeout)
        }
    }

    pub fn status(&self) -> CycleStatus {
        self.ctx.status.get(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.status().is_running()
    }

    /// 停止控制周期、关闭链路并等待线程退出（幂等）
    pub fn disconnect(&self) {
        let mut session = self.session.lock();

        self.ctx.request_stop();
        if !self.ctx.wait_for_stop(Some(JOIN_TIMEOUT)) {
            error!("Control cycle did not stop within {:?}", JOIN_TIMEOUT);
        }

        // Release: 读线程看到 false 时也能看到之前的全部写入
        self.reader_running.store(false, Ordering::Release);
        self.ctx.close_transmitter();
        self.ctx.state.lock().connected = false;

        if let Some(handle) = session.cycle_thread.take()
            && let Err(_e) = handle.join_timeout(JOIN_TIMEOUT)
        {
            error!(
                "Control cycle thread panicked or failed to shut down within {:?}",
                JOIN_TIMEOUT
            );
        }

        if let Some(handle) = session.reader_thread.take() {
            if let Err(_e) = handle.join_timeout(JOIN_TIMEOUT) {
                error!(
                    "Reader thread panicked or failed to shut down within {:?}",
                    JOIN_TIMEOUT
                );
            }
            info!("Robot driver disconnected");
        }
    }

    // ------------------------------------------------------------------
    // 状态
    // ------------------------------------------------------------------

    /// 获取状态锁
    pub fn lock(&self) -> RobotGuard<'_> {
        RobotGuard {
            guard: self.ctx.state.lock(),
        }
    }

    /// 状态副本
    pub fn state(&self) -> RobotState {
        self.ctx.state.lock().clone()
    }

    pub fn snapshot(&self) -> RobotSnapshot {
        self.ctx.state.lock().snapshot()
    }

    /// 最近一次仲裁后的运动指令（无锁）
    pub fn motion_command(&self) -> Arc<MotionCommand> {
        self.ctx.command.load_full()
    }

    /// 最近一次仲裁结果
    pub fn last_resolved(&self) -> DesireSet {
        self.ctx.arbitration.lock().resolver.last_resolved().clone()
    }

    /// 链路是否连通（读线程最近一次收发未报告断开）
    pub fn is_connected(&self) -> bool {
        !self.ctx.disconnected.load(Ordering::Acquire) && self.ctx.state.lock().connected
    }

    /// 连接超时窗口内收到过数据包
    pub fn is_responsive(&self) -> bool {
        self.ctx.monitor.check_connection()
    }

    pub fn time_since_last_packet(&self) -> Duration {
        self.ctx.monitor.time_since_last_packet()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.ctx.metrics.reset();
    }

    // ------------------------------------------------------------------
    // 行为
    // ------------------------------------------------------------------

    /// 注册行为，优先级高者先执行
    pub fn add_behavior(&self, priority: i32, behavior: impl Behavior + 'static) -> BehaviorHandle {
        self.ctx
            .arbitration
            .lock()
            .behaviors
            .register(priority, behavior)
    }

    pub fn add_behavior_boxed(&self, priority: i32, behavior: Box<dyn Behavior>) -> BehaviorHandle {
        self.ctx
            .arbitration
            .lock()
            .behaviors
            .register_boxed(priority, behavior)
    }

    /// 注销行为，句柄不存在时返回 false
    pub fn remove_behavior(&self, handle: BehaviorHandle) -> bool {
        self.ctx
            .arbitration
            .lock()
            .behaviors
            .unregister(handle)
            .is_some()
    }

    /// 激活 / 停用行为，句柄不存在时返回 false
    pub fn set_behavior_active(&self, handle: BehaviorHandle, active: bool) -> bool {
        self.ctx
            .arbitration
            .lock()
            .behaviors
            .set_active(handle, active)
    }

    pub fn find_behavior(&self, name: &str) -> Option<BehaviorHandle> {
        self.ctx.arbitration.lock().behaviors.find(name)
    }

    /// 按执行顺序列出行为
    pub fn list_behaviors(&self) -> Vec<BehaviorInfo> {
        self.ctx.arbitration.lock().behaviors.list()
    }

    pub fn resolve_mode(&self) -> ResolveMode {
        self.ctx.arbitration.lock().resolver.mode()
    }

    pub fn set_resolve_mode(&self, mode: ResolveMode) {
        self.ctx.arbitration.lock().resolver.set_mode(mode);
    }

    // ------------------------------------------------------------------
    // 周期任务
    // ------------------------------------------------------------------

    /// 注册周期任务
    ///
    /// 内置仲裁任务优先级为 [`crate::cycle::ARBITRATION_PRIORITY`]，
    /// 需要读取仲裁结果的任务应使用更低的优先级。
    pub fn add_task(
        &self,
        name: &str,
        priority: i32,
        task: impl CycleTask + 'static,
    ) -> TaskHandle {
        self.ctx.tasks.lock().add(name, priority, Box::new(task))
    }

    /// 注销周期任务（内置任务不能注销）
    pub fn remove_task(&self, handle: TaskHandle) -> bool {
        self.ctx.tasks.lock().remove(handle)
    }

    /// (名称, 优先级)，按执行顺序
    pub fn list_tasks(&self) -> Vec<(String, i32)> {
        self.ctx.tasks.lock().list()
    }

    // ------------------------------------------------------------------
    // 数据包处理器
    // ------------------------------------------------------------------

    pub fn add_packet_handler(
        &self,
        class: PacketClass,
        handler: impl PacketHandler + 'static,
    ) -> HandlerHandle {
        self.ctx.handlers.write().add(class, handler)
    }

    /// 独占认领一个数据包 ID
    ///
    /// 已被认领时返回 [`DriverError::HandlerConflict`]。
    pub fn claim_packet_id(
        &self,
        id: u8,
        handler: impl PacketHandler + 'static,
    ) -> Result<HandlerHandle, DriverError> {
        self.ctx.handlers.write().claim(id, handler)
    }

    pub fn remove_packet_handler(&self, handle: HandlerHandle) -> bool {
        self.ctx.handlers.write().remove(handle)
    }

    // ------------------------------------------------------------------
    // 原始命令
    // ------------------------------------------------------------------

    pub fn send_packet(&self, packet: &Packet) -> Result<(), DriverError> {
        self.ctx.send(std::slice::from_ref(packet))
    }

    pub fn com(&self, id: u8) -> Result<(), DriverError> {
        self.send_packet(&protocol::com(id))
    }

    pub fn com_int(&self, id: u8, value: i16) -> Result<(), DriverError> {
        self.send_packet(&protocol::com_int(id, value))
    }

    pub fn com_2bytes(&self, id: u8, high: u8, low: u8) -> Result<(), DriverError> {
        self.send_packet(&protocol::com_2bytes(id, high, low))
    }

    pub fn com_str(&self, id: u8, text: &str) -> Result<(), DriverError> {
        self.send_packet(&protocol::com_str(id, text))
    }

    pub fn enable_motors(&self, enable: bool) -> Result<(), DriverError> {
        self.send_packet(&protocol::enable_motors(enable))
    }

    /// 停止运动（电机保持使能）
    pub fn stop_motion(&self) -> Result<(), DriverError> {
        self.send_packet(&protocol::stop())
    }

    pub fn estop(&self) -> Result<(), DriverError> {
        self.send_packet(&protocol::estop())
    }

    /// 直接运动模式：仲裁照常执行，但结果不再转换为运动命令
    pub fn set_direct_motion(&self, enabled: bool) {
        self.ctx.direct_motion.store(enabled, Ordering::Release);
        debug!("Direct motion mode: {}", enabled);
    }

    pub fn is_direct_motion(&self) -> bool {
        self.ctx.direct_motion.load(Ordering::Acquire)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        self.disconnect();
    }
}
