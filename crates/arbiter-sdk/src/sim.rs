//! 仿真控制器
//!
//! 在内存回环链路的另一端模拟一台差速底盘控制器：解析驱动发来的运动命令，
//! 按加速度上限积分出速度与位姿，并周期性回传状态包。
//! 用于演示与端到端测试，不追求动力学精度。

use arbiter_action::{normalize_deg, sub_angle};
use arbiter_link::{MockLink, MockRemote};
use arbiter_protocol::{
    CMD_ENABLE, CMD_ESTOP, CMD_HEAD, CMD_ROT_VEL, CMD_SET_MAX_NEG_VEL, CMD_SET_MAX_ROT_VEL,
    CMD_SET_MAX_VEL, CMD_SET_ROT_ACCEL, CMD_SET_TRANS_ACCEL, CMD_STOP, CMD_VEL, Packet,
    StatusFlags, StatusPacket, decode_int_arg,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

// 航向控制比例系数（1/s）
const HEADING_GAIN: f64 = 2.0;

/// 仿真底盘状态
#[derive(Debug, Clone, PartialEq)]
pub struct SimState {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub vel: f64,
    pub rot_vel: f64,
    pub motors_enabled: bool,
    pub estopped: bool,
    pub target_vel: f64,
    pub target_rot_vel: f64,
    /// 绝对航向目标，设置后旋转速度由航向误差决定
    pub target_heading: Option<f64>,
    pub max_vel: f64,
    pub max_neg_vel: f64,
    pub max_rot_vel: f64,
    pub trans_accel: f64,
    pub trans_decel: f64,
    pub rot_accel: f64,
    pub rot_decel: f64,
    pub battery_voltage: f64,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            heading: 0.0,
            vel: 0.0,
            rot_vel: 0.0,
            motors_enabled: false,
            estopped: false,
            target_vel: 0.0,
            target_rot_vel: 0.0,
            target_heading: None,
            max_vel: 1500.0,
            max_neg_vel: 1500.0,
            max_rot_vel: 300.0,
            trans_accel: 3000.0,
            trans_decel: 3000.0,
            rot_accel: 600.0,
            rot_decel: 600.0,
            battery_voltage: 13.0,
        }
    }
}

impl SimState {
    /// 应用一个命令包
    pub fn apply_command(&mut self, packet: &Packet) {
        let arg = decode_int_arg(packet).map(f64::from);
        match (packet.id(), arg) {
            (CMD_ENABLE, Some(v)) => {
                self.motors_enabled = v != 0.0;
                if self.motors_enabled {
                    self.estopped = false;
                }
            },
            (CMD_VEL, Some(v)) => self.target_vel = v,
            (CMD_ROT_VEL, Some(v)) => {
                self.target_rot_vel = v;
                self.target_heading = None;
            },
            (CMD_HEAD, Some(v)) => self.target_heading = Some(normalize_deg(v)),
            (CMD_SET_MAX_VEL, Some(v)) => self.max_vel = v.abs(),
            (CMD_SET_MAX_NEG_VEL, Some(v)) => self.max_neg_vel = v.abs(),
            (CMD_SET_MAX_ROT_VEL, Some(v)) => self.max_rot_vel = v.abs(),
            (CMD_SET_TRANS_ACCEL, Some(v)) if v > 0.0 => self.trans_accel = v,
            (CMD_SET_TRANS_ACCEL, Some(v)) if v < 0.0 => self.trans_decel = -v,
            (CMD_SET_ROT_ACCEL, Some(v)) if v > 0.0 => self.rot_accel = v,
            (CMD_SET_ROT_ACCEL, Some(v)) if v < 0.0 => self.rot_decel = -v,
            (CMD_STOP, _) => {
                self.target_vel = 0.0;
                self.target_rot_vel = 0.0;
                self.target_heading = None;
            },
            (CMD_ESTOP, _) => {
                self.estopped = true;
                self.motors_enabled = false;
                self.vel = 0.0;
                self.rot_vel = 0.0;
            },
            (id, _) => trace!("Simulator ignoring command {}", id),
        }
    }

    /// 积分 `dt`
    pub fn step(&mut self, dt: Duration) {
        let dt_s = dt.as_secs_f64();
        let (want_vel, want_rot) = if self.motors_enabled {
            let vel = self.target_vel.clamp(-self.max_neg_vel, self.max_vel);
            let rot = match self.target_heading {
                Some(target) => sub_angle(target, self.heading) * HEADING_GAIN,
                None => self.target_rot_vel,
            };
            (vel, rot.clamp(-self.max_rot_vel, self.max_rot_vel))
        } else {
            (0.0, 0.0)
        };

        self.vel = approach(self.vel, want_vel, self.trans_accel, self.trans_decel, dt_s);
        self.rot_vel = approach(self.rot_vel, want_rot, self.rot_accel, self.rot_decel, dt_s);

        let heading_rad = self.heading.to_radians();
        self.x += self.vel * heading_rad.cos() * dt_s;
        self.y += self.vel * heading_rad.sin() * dt_s;
        self.heading = normalize_deg(self.heading + self.rot_vel * dt_s);
    }

    /// 当前状态的状态包
    pub fn status_packet(&self) -> Packet {
        let mut flags = 0u16;
        if self.motors_enabled {
            flags |= StatusFlags::MOTORS_ENABLED;
        }
        if self.estopped {
            flags |= StatusFlags::ESTOP_PRESSED;
        }
        StatusPacket {
            moving: self.vel != 0.0 || self.rot_vel != 0.0,
            x_mm: self.x,
            y_mm: self.y,
            heading_deg: self.heading,
            vel: self.vel,
            rot_vel: self.rot_vel,
            lat_vel: 0.0,
            battery_voltage: self.battery_voltage,
            flags: StatusFlags(flags),
            fault_flags: 0,
        }
        .encode()
    }
}

// 加速时受 accel 限制，减速（幅值变小或反向）时受 decel 限制
fn approach(current: f64, target: f64, accel: f64, decel: f64, dt_s: f64) -> f64 {
    let speeding_up = target.abs() > current.abs() && target.signum() * current.signum() >= 0.0;
    let limit = (if speeding_up { accel } else { decel }) * dt_s;
    current + (target - current).clamp(-limit, limit)
}

/// 仿真控制器
pub struct SimulatedController {
    remote: MockRemote,
    state: SimState,
}

impl SimulatedController {
    /// 创建一对链路：驱动端与仿真控制器
    pub fn pair() -> (MockLink, SimulatedController) {
        let (link, remote) = MockLink::pair();
        (link, SimulatedController::new(remote))
    }

    pub fn new(remote: MockRemote) -> Self {
        Self {
            remote,
            state: SimState::default(),
        }
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SimState {
        &mut self.state
    }

    /// 处理收到的命令、积分 `dt` 并回传一个状态包
    pub fn step(&mut self, dt: Duration) {
        for packet in self.remote.drain_packets() {
            self.state.apply_command(&packet);
        }
        self.state.step(dt);
        self.remote.send_packet(&self.state.status_packet());
    }

    /// 在后台线程以固定周期运行
    pub fn spawn(self, period: Duration) -> SimHandle {
        let running = Arc::new(AtomicBool::new(true));
        let thread = {
            let running = running.clone();
            std::thread::Builder::new()
                .name("arbiter-sim".into())
                .spawn(move || run_sim(self, period, running))
        };
        match thread {
            Ok(thread) => SimHandle {
                running,
                thread: Some(thread),
            },
            Err(e) => {
                warn!("Failed to spawn simulator thread: {}", e);
                SimHandle {
                    running,
                    thread: None,
                }
            },
        }
    }

    /// 模拟控制器断线
    pub fn disconnect(&mut self) {
        self.remote.disconnect();
    }
}

fn run_sim(
    mut sim: SimulatedController,
    period: Duration,
    running: Arc<AtomicBool>,
) -> SimulatedController {
    debug!("Simulator started (period {:?})", period);
    let mut last = Instant::now();
    while running.load(Ordering::Acquire) {
        spin_sleep::sleep((last + period).saturating_duration_since(Instant::now()));
        let now = Instant::now();
        sim.step(now - last);
        last = now;
    }
    debug!("Simulator stopped");
    sim
}

/// 后台仿真线程句柄，drop 时停止线程
pub struct SimHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<SimulatedController>>,
}

impl SimHandle {
    /// 停止仿真线程并取回控制器
    pub fn stop(mut self) -> Option<SimulatedController> {
        self.running.store(false, Ordering::Release);
        self.thread.take().and_then(|t| t.join().ok())
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
