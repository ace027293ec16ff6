use crate::behavior::{Behavior, BehaviorError};
use crate::channel::MAX_STRENGTH;
use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;

/// 运动参数设置
///
/// 各参数为 0 表示不设置。所有参数以最大强度提交；`override_faster` 为假时
/// 作为硬限制参与覆盖合并（取最严格值）。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MovementParams {
    pub max_vel: f64,
    /// 倒车速度上限幅值
    pub max_neg_vel: f64,
    pub trans_accel: f64,
    pub trans_decel: f64,
    pub max_rot_vel: f64,
    pub rot_accel: f64,
    pub rot_decel: f64,
    pub max_lat_vel: f64,
    pub lat_accel: f64,
    pub lat_decel: f64,
}

/// 运动参数行为
pub struct MovementParameters {
    name: String,
    params: MovementParams,
    enabled: bool,
    override_faster: bool,
    include_lateral: bool,
}

impl MovementParameters {
    pub fn new(name: impl Into<String>, params: MovementParams) -> Self {
        Self {
            name: name.into(),
            params,
            enabled: true,
            override_faster: false,
            include_lateral: true,
        }
    }

    /// 为真时参数按加权平均参与合并，允许更快的设置胜出
    pub fn with_override_faster(mut self, override_faster: bool) -> Self {
        self.override_faster = override_faster;
        self
    }

    /// 是否同时设置横向参数
    pub fn with_lateral(mut self, include_lateral: bool) -> Self {
        self.include_lateral = include_lateral;
        self
    }

    pub fn set_params(&mut self, params: MovementParams) {
        self.params = params;
    }

    pub fn params(&self) -> &MovementParams {
        &self.params
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// 禁用后行为仍然执行，但不提交任何期望
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Behavior for MovementParameters {
    fn name(&self) -> &str {
        &self.name
    }

    fn fire(&mut self, _: &DesireSet, _: &RobotSnapshot) -> Result<DesireSet, BehaviorError> {
        let mut desired = DesireSet::new();
        if !self.enabled {
            return Ok(desired);
        }

        let p = &self.params;
        let safest = !self.override_faster;
        let s = MAX_STRENGTH;

        if p.max_vel > 0.0 {
            desired.set_max_vel(p.max_vel, s, safest);
        }
        if p.max_neg_vel > 0.0 {
            desired.set_max_neg_vel(-p.max_neg_vel.abs(), s, safest);
        }
        if p.trans_accel > 0.0 {
            desired.set_trans_accel(p.trans_accel, s, safest);
        }
        if p.trans_decel > 0.0 {
            desired.set_trans_decel(p.trans_decel, s, safest);
        }
        if p.max_rot_vel > 0.0 {
            desired.set_max_rot_vel(p.max_rot_vel, s, safest);
        }
        if p.rot_accel > 0.0 {
            desired.set_rot_accel(p.rot_accel, s, safest);
        }
        if p.rot_decel > 0.0 {
            desired.set_rot_decel(p.rot_decel, s, safest);
        }

        if self.include_lateral {
            if p.max_lat_vel > 0.0 {
                desired.set_max_left_lat_vel(p.max_lat_vel, s, safest);
                desired.set_max_right_lat_vel(p.max_lat_vel, s, safest);
            }
            if p.lat_accel > 0.0 {
                desired.set_lat_accel(p.lat_accel, s, safest);
            }
            if p.lat_decel > 0.0 {
                desired.set_lat_decel(p.lat_decel, s, safest);
            }
        }
        Ok(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::desired::Channel;

    fn fire(b: &mut MovementParameters) -> DesireSet {
        b.fire(&DesireSet::new(), &RobotSnapshot::default()).unwrap()
    }

    #[test]
    fn test_zero_params_unset() {
        let mut b = MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 400.0,
                max_neg_vel: 100.0,
                ..Default::default()
            },
        );
        let d = fire(&mut b);
        assert_eq!(d.max_vel().value(), 400.0);
        assert!(d.max_vel().allow_override());
        assert_eq!(d.channel(Channel::MaxNegVel).value(), -100.0);
        assert!(!d.channel(Channel::TransAccel).is_set());
        assert!(!d.channel(Channel::MaxLeftLatVel).is_set());
    }

    #[test]
    fn test_disabled_contributes_nothing() {
        let mut b = MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 400.0,
                ..Default::default()
            },
        );
        b.disable();
        assert!(!fire(&mut b).is_anything_desired());
        b.enable();
        assert!(fire(&mut b).is_anything_desired());
    }

    #[test]
    fn test_override_faster_disables_override() {
        let mut b = MovementParameters::new(
            "params",
            MovementParams {
                max_vel: 400.0,
                max_lat_vel: 300.0,
                ..Default::default()
            },
        )
        .with_override_faster(true);
        let d = fire(&mut b);
        assert!(!d.max_vel().allow_override());
        assert_eq!(d.channel(Channel::MaxRightLatVel).value(), 300.0);

        let mut b = b.with_lateral(false);
        assert!(!fire(&mut b).channel(Channel::MaxRightLatVel).is_set());
    }
}
