//! 机器人状态快照
//!
//! 控制周期在持锁期间拍下快照交给行为读取，行为不直接接触共享状态。

/// 行为可见的机器人状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RobotSnapshot {
    /// 位置 x（mm）
    pub x: f64,
    /// 位置 y（mm）
    pub y: f64,
    /// 航向（deg，[-180, 180)）
    pub heading: f64,
    /// 平移速度（mm/s）
    pub vel: f64,
    /// 旋转速度（deg/s）
    pub rot_vel: f64,
    /// 横向速度（mm/s）
    pub lat_vel: f64,
    /// 电池电压（V）
    pub battery_voltage: f64,
    pub motors_enabled: bool,
    pub left_stalled: bool,
    pub right_stalled: bool,
    pub connected: bool,
    /// 控制周期计数
    pub cycle: u64,
}

impl RobotSnapshot {
    pub fn is_stalled(&self) -> bool {
        self.left_stalled || self.right_stalled
    }
}
