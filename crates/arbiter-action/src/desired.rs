//! 期望集合
//!
//! 一个行为在一个控制周期内的完整运动提议：平移、旋转（相对航向或角速度二选一）、
//! 横向运动，以及各轴的速度上限和加减速度。

use crate::channel::{DesireChannel, MIN_STRENGTH, NO_STRENGTH, OverridePolicy};
use crate::math::normalize_deg;
use std::fmt;
use tracing::debug;

/// 通道标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// 平移速度（mm/s）
    Vel,
    /// 最大平移速度
    MaxVel,
    /// 最大倒车速度（负值）
    MaxNegVel,
    TransAccel,
    TransDecel,
    /// 旋转速度（deg/s）
    RotVel,
    /// 相对航向（deg）
    DeltaHeading,
    MaxRotVel,
    /// 正方向（逆时针）最大旋转速度
    MaxRotVelPos,
    /// 负方向（顺时针）最大旋转速度
    MaxRotVelNeg,
    RotAccel,
    RotDecel,
    /// 横向速度（mm/s，正值向左）
    LatVel,
    MaxLeftLatVel,
    MaxRightLatVel,
    LatAccel,
    LatDecel,
}

impl Channel {
    pub const COUNT: usize = 17;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Vel,
        Channel::MaxVel,
        Channel::MaxNegVel,
        Channel::TransAccel,
        Channel::TransDecel,
        Channel::RotVel,
        Channel::DeltaHeading,
        Channel::MaxRotVel,
        Channel::MaxRotVelPos,
        Channel::MaxRotVelNeg,
        Channel::RotAccel,
        Channel::RotDecel,
        Channel::LatVel,
        Channel::MaxLeftLatVel,
        Channel::MaxRightLatVel,
        Channel::LatAccel,
        Channel::LatDecel,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Vel => "vel",
            Channel::MaxVel => "max vel",
            Channel::MaxNegVel => "max neg vel",
            Channel::TransAccel => "trans accel",
            Channel::TransDecel => "trans decel",
            Channel::RotVel => "rot vel",
            Channel::DeltaHeading => "delta heading",
            Channel::MaxRotVel => "max rot vel",
            Channel::MaxRotVelPos => "max rot vel pos",
            Channel::MaxRotVelNeg => "max rot vel neg",
            Channel::RotAccel => "rot accel",
            Channel::RotDecel => "rot decel",
            Channel::LatVel => "lat vel",
            Channel::MaxLeftLatVel => "max left lat vel",
            Channel::MaxRightLatVel => "max right lat vel",
            Channel::LatAccel => "lat accel",
            Channel::LatDecel => "lat decel",
        }
    }

    /// 覆盖策略：减速度和倒车上限取最大值，其余取最小值
    pub fn policy(self) -> OverridePolicy {
        match self {
            Channel::TransDecel | Channel::RotDecel | Channel::LatDecel | Channel::MaxNegVel => {
                OverridePolicy::Max
            },
            _ => OverridePolicy::Min,
        }
    }

    /// 旋转指令通道（受旋转优先规则约束）
    pub fn is_rotation(self) -> bool {
        matches!(self, Channel::RotVel | Channel::DeltaHeading)
    }
}

/// 期望集合
#[derive(Debug, Clone, PartialEq)]
pub struct DesireSet {
    channels: [DesireChannel; Channel::COUNT],
    heading: f64,
    heading_strength: f64,
    heading_set: bool,
}

impl Default for DesireSet {
    fn default() -> Self {
        Self::new()
    }
}

impl DesireSet {
    pub fn new() -> Self {
        Self {
            channels: Channel::ALL.map(|c| DesireChannel::new(c.policy())),
            heading: 0.0,
            heading_strength: NO_STRENGTH,
            heading_set: false,
        }
    }

    /// 清空所有通道和绝对航向
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.heading = 0.0;
        self.heading_strength = NO_STRENGTH;
        self.heading_set = false;
    }

    pub fn channel(&self, channel: Channel) -> &DesireChannel {
        &self.channels[channel.index()]
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut DesireChannel {
        &mut self.channels[channel.index()]
    }

    /// 通用设置入口
    pub fn set(&mut self, channel: Channel, value: f64, strength: f64, allow_override: bool) {
        self.channel_mut(channel).set(value, strength, allow_override);
    }

    // ------------------------------------------------------------------
    // 平移
    // ------------------------------------------------------------------

    pub fn set_vel(&mut self, vel: f64, strength: f64) {
        self.set(Channel::Vel, vel, strength, false);
    }

    /// `use_slowest` 为真时与其他行为的上限取最小值
    pub fn set_max_vel(&mut self, max_vel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxVel, max_vel, strength, use_slowest);
    }

    /// 最大倒车速度应为负值
    pub fn set_max_neg_vel(&mut self, max_neg_vel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxNegVel, max_neg_vel, strength, use_slowest);
    }

    pub fn set_trans_accel(&mut self, accel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::TransAccel, accel, strength, use_slowest);
    }

    /// `use_fastest` 为真时与其他行为取最大减速度
    pub fn set_trans_decel(&mut self, decel: f64, strength: f64, use_fastest: bool) {
        self.set(Channel::TransDecel, decel, strength, use_fastest);
    }

    // ------------------------------------------------------------------
    // 旋转
    // ------------------------------------------------------------------

    pub fn set_rot_vel(&mut self, rot_vel: f64, strength: f64) {
        self.set(Channel::RotVel, rot_vel, strength, false);
    }

    pub fn set_delta_heading(&mut self, delta: f64, strength: f64) {
        self.set(Channel::DeltaHeading, delta, strength, false);
    }

    /// 绝对航向，合并前由 [`DesireSet::account_for_heading`] 转换为相对航向
    pub fn set_heading(&mut self, heading: f64, strength: f64) {
        self.heading = heading;
        self.heading_strength = strength;
        self.heading_set = true;
    }

    pub fn set_max_rot_vel(&mut self, max_rot_vel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxRotVel, max_rot_vel, strength, use_slowest);
    }

    pub fn set_max_rot_vel_pos(&mut self, max_rot_vel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxRotVelPos, max_rot_vel, strength, use_slowest);
    }

    pub fn set_max_rot_vel_neg(&mut self, max_rot_vel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxRotVelNeg, max_rot_vel, strength, use_slowest);
    }

    pub fn set_rot_accel(&mut self, accel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::RotAccel, accel, strength, use_slowest);
    }

    pub fn set_rot_decel(&mut self, decel: f64, strength: f64, use_fastest: bool) {
        self.set(Channel::RotDecel, decel, strength, use_fastest);
    }

    // ------------------------------------------------------------------
    // 横向
    // ------------------------------------------------------------------

    pub fn set_left_lat_vel(&mut self, lat_vel: f64, strength: f64) {
        self.set(Channel::LatVel, lat_vel, strength, false);
    }

    /// 向右的横向速度，内部存为负值
    pub fn set_right_lat_vel(&mut self, lat_vel: f64, strength: f64) {
        self.set(Channel::LatVel, -lat_vel, strength, false);
    }

    pub fn set_max_left_lat_vel(&mut self, max: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxLeftLatVel, max, strength, use_slowest);
    }

    pub fn set_max_right_lat_vel(&mut self, max: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::MaxRightLatVel, max, strength, use_slowest);
    }

    pub fn set_lat_accel(&mut self, accel: f64, strength: f64, use_slowest: bool) {
        self.set(Channel::LatAccel, accel, strength, use_slowest);
    }

    pub fn set_lat_decel(&mut self, decel: f64, strength: f64, use_fastest: bool) {
        self.set(Channel::LatDecel, decel, strength, use_fastest);
    }

    // ------------------------------------------------------------------
    // 读取
    // ------------------------------------------------------------------

    pub fn vel(&self) -> &DesireChannel {
        self.channel(Channel::Vel)
    }

    pub fn max_vel(&self) -> &DesireChannel {
        self.channel(Channel::MaxVel)
    }

    pub fn rot_vel(&self) -> &DesireChannel {
        self.channel(Channel::RotVel)
    }

    pub fn delta_heading(&self) -> &DesireChannel {
        self.channel(Channel::DeltaHeading)
    }

    pub fn lat_vel(&self) -> &DesireChannel {
        self.channel(Channel::LatVel)
    }

    pub fn heading(&self) -> Option<(f64, f64)> {
        self.heading_set.then_some((self.heading, self.heading_strength))
    }

    /// 是否有任何通道或绝对航向携带有效强度
    pub fn is_anything_desired(&self) -> bool {
        self.heading_set || self.channels.iter().any(DesireChannel::is_set)
    }

    // ------------------------------------------------------------------
    // 合并 / 平均
    // ------------------------------------------------------------------

    /// 绝对航向转换为相对航向 `normalize(h - r)`，并清除绝对航向标志
    pub fn account_for_heading(&mut self, robot_heading: f64) {
        if self.heading_set {
            let delta = normalize_deg(self.heading - robot_heading);
            self.set_delta_heading(delta, self.heading_strength);
        }
        self.heading_set = false;
    }

    /// 按优先级合并（`self` 为累加器，先合并者优先）
    pub fn merge(&mut self, other: &DesireSet) {
        for channel in Channel::ALL.into_iter().filter(|c| !c.is_rotation()) {
            self.channels[channel.index()].merge(other.channel(channel));
        }
        self.combine_rotation(other, DesireChannel::strength, DesireChannel::merge);
    }

    pub fn start_average(&mut self) {
        for channel in &mut self.channels {
            channel.start_average();
        }
    }

    pub fn add_average(&mut self, other: &DesireSet) {
        for channel in Channel::ALL.into_iter().filter(|c| !c.is_rotation()) {
            self.channels[channel.index()].add_average(other.channel(channel));
        }
        self.combine_rotation(
            other,
            DesireChannel::average_strength,
            DesireChannel::add_average,
        );
    }

    pub fn end_average(&mut self) {
        for channel in &mut self.channels {
            channel.end_average();
        }
    }

    /// 旋转优先规则
    ///
    /// 累加器已在相对航向上有强度时只合并相对航向；已在角速度上有强度时只合并角速度；
    /// 都没有时两者都合并（下发时相对航向优先）。
    fn combine_rotation(
        &mut self,
        other: &DesireSet,
        engaged: fn(&DesireChannel) -> f64,
        combine: fn(&mut DesireChannel, &DesireChannel),
    ) {
        let delta = Channel::DeltaHeading.index();
        let rot = Channel::RotVel.index();

        if engaged(&self.channels[delta]) > NO_STRENGTH {
            combine(&mut self.channels[delta], &other.channels[delta]);
        } else if engaged(&self.channels[rot]) > NO_STRENGTH {
            combine(&mut self.channels[rot], &other.channels[rot]);
        } else {
            combine(&mut self.channels[delta], &other.channels[delta]);
            combine(&mut self.channels[rot], &other.channels[rot]);
        }
    }

    // ------------------------------------------------------------------
    // 检查与日志
    // ------------------------------------------------------------------

    /// 数值合理性检查，越界值截断并告警
    ///
    /// 返回被截断的通道数。
    pub fn sanity_check(&mut self, behavior: &str) -> usize {
        let mut clamped = 0;
        for channel in Channel::ALL {
            let c = &mut self.channels[channel.index()];
            let hit = match channel {
                Channel::Vel | Channel::RotVel | Channel::DeltaHeading | Channel::LatVel => false,
                Channel::MaxNegVel => c.check_upper_bound(behavior, channel.name(), 0.0),
                _ => c.check_lower_bound(behavior, channel.name(), 0.0),
            };
            clamped += usize::from(hit);
        }
        clamped
    }

    /// 以 debug 级别输出所有有效通道
    pub fn log_desired(&self, prefix: &str) {
        if self.is_anything_desired() {
            debug!("{}: {}", prefix, self);
        } else {
            debug!("{}: nothing desired", prefix);
        }
    }
}

impl fmt::Display for DesireSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for channel in Channel::ALL {
            let c = self.channel(channel);
            if c.strength() < MIN_STRENGTH {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={:.1}@{:.2}", channel.name(), c.value(), c.strength())?;
            if c.allow_override() {
                f.write_str("!")?;
            }
        }
        if let Some((heading, strength)) = self.heading() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "heading={:.1}@{:.2}", heading, strength)?;
        }
        Ok(())
    }
}
