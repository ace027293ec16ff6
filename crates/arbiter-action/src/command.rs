//! 最终运动指令
//!
//! [`MotionCommand`] 是仲裁结果落到数值上的形态：每个通道一个数值。
//! 本周期没有任何行为给出强度的通道保持上一周期的值。
//!
//! [`KinematicLimits`] 是硬件允许的运动学上限，仲裁后由限幅任务检查。

use crate::desired::{Channel, DesireSet};
use crate::math::normalize_deg;

/// 旋转指令：角速度与绝对航向二选一
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RotationCommand {
    /// 旋转速度（deg/s）
    Velocity(f64),
    /// 绝对目标航向（deg，[-180, 180)）
    Heading(f64),
}

impl Default for RotationCommand {
    fn default() -> Self {
        RotationCommand::Velocity(0.0)
    }
}

/// 运动学上限
///
/// 所有值均为非负幅值；倒车速度上限在通道中以负值表示。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KinematicLimits {
    /// 最大前进速度（mm/s）
    pub max_vel: f64,
    /// 最大倒车速度幅值（mm/s）
    pub max_neg_vel: f64,
    /// 最大旋转速度（deg/s）
    pub max_rot_vel: f64,
    /// 最大横向速度（mm/s）
    pub max_lat_vel: f64,
    pub trans_accel: f64,
    pub trans_decel: f64,
    pub rot_accel: f64,
    pub rot_decel: f64,
    pub lat_accel: f64,
    pub lat_decel: f64,
}

impl Default for KinematicLimits {
    fn default() -> Self {
        Self {
            max_vel: 1000.0,
            max_neg_vel: 1000.0,
            max_rot_vel: 180.0,
            max_lat_vel: 1000.0,
            trans_accel: 2000.0,
            trans_decel: 2000.0,
            rot_accel: 360.0,
            rot_decel: 360.0,
            lat_accel: 1000.0,
            lat_decel: 1000.0,
        }
    }
}

impl KinematicLimits {
    /// 把期望集合限制在上限之内，越界值截断并告警
    ///
    /// 返回被截断的通道数。
    pub fn enforce(&self, desired: &mut DesireSet, source: &str) -> usize {
        let mut clamped = 0;
        let mut upper = |channel: Channel, bound: f64| {
            clamped += usize::from(desired.channel_mut(channel).check_upper_bound(
                source,
                channel.name(),
                bound,
            ));
        };
        upper(Channel::Vel, self.max_vel);
        upper(Channel::MaxVel, self.max_vel);
        upper(Channel::RotVel, self.max_rot_vel);
        upper(Channel::MaxRotVel, self.max_rot_vel);
        upper(Channel::MaxRotVelPos, self.max_rot_vel);
        upper(Channel::MaxRotVelNeg, self.max_rot_vel);
        upper(Channel::LatVel, self.max_lat_vel);
        upper(Channel::MaxLeftLatVel, self.max_lat_vel);
        upper(Channel::MaxRightLatVel, self.max_lat_vel);
        upper(Channel::TransAccel, self.trans_accel);
        upper(Channel::TransDecel, self.trans_decel);
        upper(Channel::RotAccel, self.rot_accel);
        upper(Channel::RotDecel, self.rot_decel);
        upper(Channel::LatAccel, self.lat_accel);
        upper(Channel::LatDecel, self.lat_decel);

        let mut lower = |channel: Channel, bound: f64| {
            clamped += usize::from(desired.channel_mut(channel).check_lower_bound(
                source,
                channel.name(),
                bound,
            ));
        };
        lower(Channel::Vel, -self.max_neg_vel);
        lower(Channel::MaxNegVel, -self.max_neg_vel);
        lower(Channel::RotVel, -self.max_rot_vel);
        lower(Channel::LatVel, -self.max_lat_vel);
        clamped
    }

    fn initial_value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Vel | Channel::RotVel | Channel::DeltaHeading | Channel::LatVel => 0.0,
            Channel::MaxVel => self.max_vel,
            Channel::MaxNegVel => -self.max_neg_vel,
            Channel::TransAccel => self.trans_accel,
            Channel::TransDecel => self.trans_decel,
            Channel::MaxRotVel | Channel::MaxRotVelPos | Channel::MaxRotVelNeg => self.max_rot_vel,
            Channel::RotAccel => self.rot_accel,
            Channel::RotDecel => self.rot_decel,
            Channel::MaxLeftLatVel | Channel::MaxRightLatVel => self.max_lat_vel,
            Channel::LatAccel => self.lat_accel,
            Channel::LatDecel => self.lat_decel,
        }
    }
}

/// 运动指令
#[derive(Debug, Clone, PartialEq)]
pub struct MotionCommand {
    values: [f64; Channel::COUNT],
    // 曾经被仲裁结果设置过的通道
    commanded: u32,
    // 最近一次 apply 中数值发生变化的通道
    changed: u32,
    rotation: RotationCommand,
    cycle: u64,
}

impl Default for MotionCommand {
    fn default() -> Self {
        Self::new(&KinematicLimits::default())
    }
}

impl MotionCommand {
    /// 以运动学上限作为各上限通道的初值
    pub fn new(limits: &KinematicLimits) -> Self {
        Self {
            values: Channel::ALL.map(|c| limits.initial_value(c)),
            commanded: 0,
            changed: 0,
            rotation: RotationCommand::default(),
            cycle: 0,
        }
    }

    /// 应用一次仲裁结果
    ///
    /// 有强度的通道更新数值；相对航向按当前航向换算为绝对目标航向。
    pub fn apply(&mut self, resolved: &DesireSet, robot_heading: f64, cycle: u64) {
        self.changed = 0;
        self.cycle = cycle;

        for channel in Channel::ALL {
            let c = resolved.channel(channel);
            if !c.is_set() {
                continue;
            }
            let bit = 1u32 << channel.index();
            if self.commanded & bit == 0 || self.values[channel.index()] != c.value() {
                self.changed |= bit;
            }
            self.commanded |= bit;
            self.values[channel.index()] = c.value();
        }

        if resolved.delta_heading().is_set() {
            let target = normalize_deg(robot_heading + resolved.delta_heading().value());
            self.rotation = RotationCommand::Heading(target);
        } else if resolved.rot_vel().is_set() {
            self.rotation = RotationCommand::Velocity(resolved.rot_vel().value());
        }
    }

    /// 通道当前值
    pub fn value(&self, channel: Channel) -> f64 {
        self.values[channel.index()]
    }

    pub fn vel(&self) -> f64 {
        self.value(Channel::Vel)
    }

    pub fn lat_vel(&self) -> f64 {
        self.value(Channel::LatVel)
    }

    pub fn rotation(&self) -> RotationCommand {
        self.rotation
    }

    /// 通道是否曾被仲裁结果设置
    pub fn is_commanded(&self, channel: Channel) -> bool {
        self.commanded & (1u32 << channel.index()) != 0
    }

    /// 通道在最近一次 apply 中是否变化（首次设置也算变化）
    pub fn changed(&self, channel: Channel) -> bool {
        self.changed & (1u32 << channel.index()) != 0
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// 双向旋转上限中较小者
    pub fn effective_max_rot_vel(&self) -> f64 {
        self.value(Channel::MaxRotVel)
            .min(self.value(Channel::MaxRotVelPos))
            .min(self.value(Channel::MaxRotVelNeg))
    }

    /// 左右横向上限中较小者
    pub fn effective_max_lat_vel(&self) -> f64 {
        self.value(Channel::MaxLeftLatVel)
            .min(self.value(Channel::MaxRightLatVel))
    }
}
