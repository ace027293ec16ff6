//! 机器人共享状态
//!
//! 由一把 `parking_lot::Mutex` 保护：读线程每收到一个数据包短暂加锁更新，
//! 控制周期在整个周期内持锁。行为只读取周期开始时拍下的快照。

use arbiter_action::RobotSnapshot;
use arbiter_protocol::{SafetyState, StatusFlags, StatusPacket};
use std::time::Instant;

/// 机器人状态
#[derive(Debug, Clone, Default)]
pub struct RobotState {
    /// 位置 x（mm）
    pub x: f64,
    /// 位置 y（mm）
    pub y: f64,
    /// 航向（deg）
    pub heading: f64,
    pub vel: f64,
    pub rot_vel: f64,
    pub lat_vel: f64,
    /// 电池电压（V）
    pub battery_voltage: f64,
    /// 控制器报告电机正在运动
    pub moving: bool,
    pub flags: StatusFlags,
    pub fault_flags: u16,
    /// 链路是否连通
    pub connected: bool,
    /// 最近一次状态包到达时间
    pub last_status: Option<Instant>,
    /// 已处理的状态包数
    pub status_packets: u64,
    /// 已收到的固件调试消息数
    pub debug_messages: u64,
    /// 最近一条固件调试消息
    pub last_debug_message: Option<String>,
    /// 最近一次安全系统状态
    pub safety: Option<SafetyState>,
    /// 已收到的安全警告数
    pub safety_warnings: u64,
    /// 控制周期计数
    pub cycle: u64,
}

impl RobotState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一个状态包
    pub fn apply_status(&mut self, status: &StatusPacket) {
        self.x = status.x_mm;
        self.y = status.y_mm;
        self.heading = status.heading_deg;
        self.vel = status.vel;
        self.rot_vel = status.rot_vel;
        self.lat_vel = status.lat_vel;
        self.battery_voltage = status.battery_voltage;
        self.moving = status.moving;
        self.flags = status.flags;
        self.fault_flags = status.fault_flags;
        self.last_status = Some(Instant::now());
        self.status_packets += 1;
    }

    pub fn motors_enabled(&self) -> bool {
        self.flags.motors_enabled()
    }

    pub fn estop_pressed(&self) -> bool {
        self.flags.estop_pressed()
    }

    /// 行为可见的快照
    pub fn snapshot(&self) -> RobotSnapshot {
        RobotSnapshot {
            x: self.x,
            y: self.y,
            heading: self.heading,
            vel: self.vel,
            rot_vel: self.rot_vel,
            lat_vel: self.lat_vel,
            battery_voltage: self.battery_voltage,
            motors_enabled: self.flags.motors_enabled(),
            left_stalled: self.flags.left_stalled(),
            right_stalled: self.flags.right_stalled(),
            connected: self.connected,
            cycle: self.cycle,
        }
    }
}
