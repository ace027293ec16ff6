//! 控制周期
//!
//! 以固定周期执行已注册的周期任务。每个周期：
//!
//! 1. 获取状态锁，周期计数加一并拍下快照
//! 2. 按优先级依次执行任务（内置仲裁任务、运动学限幅任务、用户任务）
//! 3. 把仲裁结果写入 [`MotionCommand`] 并转换为运动命令包（状态反映）
//! 4. 一次写出本周期的全部命令包，释放状态锁
//! 5. 休眠到下一周期；停止请求会唤醒休眠
//!
//! 周期超时时下一周期立即开始，不累积延迟。

use crate::context::RobotContext;
use crate::state::RobotState;
use arbiter_action::{Channel, DesireSet, MotionCommand, RobotSnapshot, RotationCommand};
use arbiter_protocol::{
    CMD_HEAD, CMD_LAT_VEL, CMD_ROT_VEL, CMD_SET_LAT_ACCEL, CMD_SET_MAX_LAT_VEL,
    CMD_SET_MAX_NEG_VEL, CMD_SET_MAX_ROT_VEL, CMD_SET_MAX_VEL, CMD_SET_ROT_ACCEL,
    CMD_SET_TRANS_ACCEL, CMD_VEL, Packet, com_int, saturate_i16,
};
use crossbeam_channel::RecvTimeoutError;
use smallvec::SmallVec;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 内置仲裁任务的优先级
pub const ARBITRATION_PRIORITY: i32 = 1000;
/// 内置运动学限幅任务的优先级（紧随仲裁之后）
pub const LIMITS_PRIORITY: i32 = 990;

/// 控制周期配置
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CycleConfig {
    /// 周期（毫秒）
    pub period_ms: u64,
    /// 执行指定周期数后自动停止
    pub max_cycles: Option<u64>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period_ms: 100,
            max_cycles: None,
        }
    }
}

impl CycleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// 一个周期内任务可访问的上下文
///
/// 任务执行期间状态锁一直被持有。
pub struct TickContext<'a> {
    /// 机器人状态（可写）
    pub state: &'a mut RobotState,
    /// 周期开始时的快照
    pub snapshot: RobotSnapshot,
    /// 本周期的仲裁结果（仲裁任务执行后才有值）
    pub resolved: Option<DesireSet>,
    outgoing: SmallVec<[Packet; 8]>,
}

impl<'a> TickContext<'a> {
    fn new(state: &'a mut RobotState) -> Self {
        let snapshot = state.snapshot();
        Self {
            state,
            snapshot,
            resolved: None,
            outgoing: SmallVec::new(),
        }
    }

    /// 当前周期序号
    pub fn cycle(&self) -> u64 {
        self.snapshot.cycle
    }

    /// 追加一个命令包，周期结束时与运动命令一起写出
    pub fn send(&mut self, packet: Packet) {
        self.outgoing.push(packet);
    }
}

/// 周期任务
///
/// 闭包 `FnMut(&mut TickContext)` 自动实现该 trait。
pub trait CycleTask: Send {
    fn run(&mut self, tick: &mut TickContext<'_>);
}

impl<F> CycleTask for F
where
    F: FnMut(&mut TickContext<'_>) + Send,
{
    fn run(&mut self, tick: &mut TickContext<'_>) {
        self(tick)
    }
}

/// 任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

enum TaskKind {
    Arbitration,
    KinematicLimits,
    User(Box<dyn CycleTask>),
}

struct TaskEntry {
    handle: TaskHandle,
    name: String,
    priority: i32,
    kind: TaskKind,
}

/// 周期任务注册表（优先级降序，同优先级按注册顺序）
pub(crate) struct TaskRegistry {
    entries: Vec<TaskEntry>,
    next_id: u64,
}

impl TaskRegistry {
    pub(crate) fn with_builtin_tasks() -> Self {
        let mut registry = Self {
            entries: Vec::new(),
            next_id: 0,
        };
        registry.insert("arbitration", ARBITRATION_PRIORITY, TaskKind::Arbitration);
        registry.insert("kinematic limits", LIMITS_PRIORITY, TaskKind::KinematicLimits);
        registry
    }

    pub(crate) fn add(&mut self, name: &str, priority: i32, task: Box<dyn CycleTask>) -> TaskHandle {
        self.insert(name, priority, TaskKind::User(task))
    }

    /// 只能移除用户任务
    pub(crate) fn remove(&mut self, handle: TaskHandle) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.handle == handle && matches!(e.kind, TaskKind::User(_))));
        before != self.entries.len()
    }

    /// (名称, 优先级)，按执行顺序
    pub(crate) fn list(&self) -> Vec<(String, i32)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), e.priority))
            .collect()
    }

    fn insert(&mut self, name: &str, priority: i32, kind: TaskKind) -> TaskHandle {
        let handle = TaskHandle(self.next_id);
        self.next_id += 1;
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        debug!("Registered cycle task '{}' with priority {}", name, priority);
        self.entries.insert(
            pos,
            TaskEntry {
                handle,
                name: name.to_string(),
                priority,
                kind,
            },
        );
        handle
    }
}

/// 执行一个周期
///
/// 一旦开始总会执行完，不响应中途的停止请求。
pub(crate) fn run_tick(ctx: &RobotContext) {
    let mut state = ctx.state.lock();
    state.cycle += 1;
    let cycle = state.cycle;
    let mut tick = TickContext::new(&mut state);

    {
        let mut tasks = ctx.tasks.lock();
        for entry in tasks.entries.iter_mut() {
            match &mut entry.kind {
                TaskKind::Arbitration => {
                    let mut arbitration = ctx.arbitration.lock();
                    let arbitration = &mut *arbitration;
                    let resolved = arbitration
                        .resolver
                        .resolve(&mut arbitration.behaviors, &tick.snapshot)
                        .clone();
                    let faults = arbitration.resolver.last_faults().len() as u64;
                    if faults > 0 {
                        ctx.metrics.behavior_faults.fetch_add(faults, Ordering::Relaxed);
                    }
                    tick.resolved = Some(resolved);
                },
                TaskKind::KinematicLimits => {
                    if let Some(resolved) = tick.resolved.as_mut() {
                        ctx.limits.enforce(resolved, "kinematic limits");
                    }
                },
                TaskKind::User(task) => {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| task.run(&mut tick)));
                    if let Err(payload) = result {
                        warn!(
                            "Cycle task '{}' panicked on cycle {}: {}",
                            entry.name,
                            cycle,
                            panic_message(payload.as_ref())
                        );
                    }
                },
            }
        }
    }

    if let Some(resolved) = tick.resolved.take() {
        let mut command = MotionCommand::clone(&ctx.command.load());
        command.apply(&resolved, tick.snapshot.heading, cycle);
        if !ctx.direct_motion.load(Ordering::Acquire) {
            reflect(&command, &mut tick.outgoing);
        }
        ctx.command.store(Arc::new(command));
    }

    if !tick.outgoing.is_empty() {
        trace!("Cycle {}: sending {} packet(s)", cycle, tick.outgoing.len());
        if let Err(e) = ctx.send(&tick.outgoing) {
            warn!("Cycle {}: failed to send commands: {}", cycle, e);
        }
    }
}

/// 把运动指令转换为命令包
///
/// 速度与旋转每周期都发送（一旦被设置过），上限与加速度只在变化时发送。
pub(crate) fn reflect(command: &MotionCommand, out: &mut SmallVec<[Packet; 8]>) {
    if command.is_commanded(Channel::Vel) {
        out.push(com_int(CMD_VEL, saturate_i16(command.vel())));
    }
    if command.is_commanded(Channel::RotVel) || command.is_commanded(Channel::DeltaHeading) {
        match command.rotation() {
            RotationCommand::Velocity(v) => out.push(com_int(CMD_ROT_VEL, saturate_i16(v))),
            RotationCommand::Heading(h) => out.push(com_int(CMD_HEAD, saturate_i16(h))),
        }
    }
    if command.is_commanded(Channel::LatVel) {
        out.push(com_int(CMD_LAT_VEL, saturate_i16(command.lat_vel())));
    }

    if command.changed(Channel::MaxVel) {
        out.push(com_int(CMD_SET_MAX_VEL, saturate_i16(command.value(Channel::MaxVel))));
    }
    if command.changed(Channel::MaxNegVel) {
        // 通道中为负值，命令参数为幅值
        let value = command.value(Channel::MaxNegVel).abs();
        out.push(com_int(CMD_SET_MAX_NEG_VEL, saturate_i16(value)));
    }
    push_accel(command, Channel::TransAccel, Channel::TransDecel, CMD_SET_TRANS_ACCEL, out);

    if command.changed(Channel::MaxRotVel)
        || command.changed(Channel::MaxRotVelPos)
        || command.changed(Channel::MaxRotVelNeg)
    {
        out.push(com_int(CMD_SET_MAX_ROT_VEL, saturate_i16(command.effective_max_rot_vel())));
    }
    push_accel(command, Channel::RotAccel, Channel::RotDecel, CMD_SET_ROT_ACCEL, out);

    if command.changed(Channel::MaxLeftLatVel) || command.changed(Channel::MaxRightLatVel) {
        out.push(com_int(CMD_SET_MAX_LAT_VEL, saturate_i16(command.effective_max_lat_vel())));
    }
    push_accel(command, Channel::LatAccel, Channel::LatDecel, CMD_SET_LAT_ACCEL, out);
}

// 加速度为正参数，减速度为负参数，共用一个命令
fn push_accel(
    command: &MotionCommand,
    accel: Channel,
    decel: Channel,
    id: u8,
    out: &mut SmallVec<[Packet; 8]>,
) {
    if command.changed(accel) {
        out.push(com_int(id, saturate_i16(command.value(accel).abs())));
    }
    if command.changed(decel) {
        out.push(com_int(id, saturate_i16(-command.value(decel).abs())));
    }
}

/// 控制周期主循环
///
/// 调用前状态必须已经是 Running；返回时状态为 Stopped，所有等待者被唤醒。
pub(crate) fn cycle_loop(ctx: &RobotContext, config: &CycleConfig) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;

        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => {
                info!("Control cycle thread priority set to MAX (realtime)");
            },
            Err(e) => {
                warn!(
                    "Failed to set control cycle thread priority: {}. \
                    On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
                    e
                );
            },
        }
    }

    // 无论以何种方式退出都要释放等待者
    let _guard = StopOnExit(ctx);

    let period = config.period();
    let mut ticks = 0u64;
    info!("Control cycle started (period {:?})", period);

    loop {
        if !ctx.status.get(Ordering::Acquire).is_running() {
            debug!("Control cycle: stop requested, exiting");
            break;
        }

        let started = Instant::now();
        run_tick(ctx);
        let elapsed = started.elapsed();
        ticks += 1;

        ctx.metrics.cycles.fetch_add(1, Ordering::Relaxed);
        ctx.metrics
            .last_cycle_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);

        if let Some(max) = config.max_cycles
            && ticks >= max
        {
            info!("Control cycle: reached max_cycles ({}), stopping", max);
            break;
        }

        if elapsed > period {
            ctx.metrics.cycle_overruns.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Control cycle overrun: tick took {:?} (period {:?})",
                elapsed, period
            );
            continue;
        }

        match ctx.wake_rx.recv_timeout(period - elapsed) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {},
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!("Control cycle stopped after {} tick(s)", ticks);
}

struct StopOnExit<'a>(&'a RobotContext);

impl Drop for StopOnExit<'_> {
    fn drop(&mut self) {
        self.0.finish_stop();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
