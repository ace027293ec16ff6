use crate::behavior::{Behavior, BehaviorError};
use crate::channel::MAX_STRENGTH;
use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;

// 上限强度低于此值视为没有被限速
const LIMIT_STRENGTH: f64 = 0.1;

/// 被限速时转向
///
/// 更高优先级的行为把最大速度压到 `speed_start` 以下时开始转向，
/// 转向量从 `speed_start` 处的 0 线性增加到 `speed_full` 处的 `turn_amount`。
/// 限速期间保持同一个转向方向。
pub struct TurnOnLimit {
    name: String,
    speed_start: f64,
    speed_full: f64,
    turn_amount: f64,
    // 1.0 向左，-1.0 向右，0.0 未转向
    turning: f64,
}

impl TurnOnLimit {
    pub fn new(name: impl Into<String>, speed_start: f64, speed_full: f64, turn_amount: f64) -> Self {
        Self {
            name: name.into(),
            speed_start,
            speed_full,
            turn_amount,
            turning: 0.0,
        }
    }

    /// 是否处于转向状态
    pub fn is_turning(&self) -> bool {
        self.turning != 0.0
    }

    fn ramp(&self, max_vel: f64) -> f64 {
        let span = self.speed_start - self.speed_full;
        if span <= 0.0 {
            return 1.0;
        }
        ((self.speed_start - max_vel) / span).clamp(0.0, 1.0)
    }
}

impl Default for TurnOnLimit {
    fn default() -> Self {
        Self::new("turn", 200.0, 100.0, 15.0)
    }
}

impl Behavior for TurnOnLimit {
    fn name(&self) -> &str {
        &self.name
    }

    fn fire(
        &mut self,
        current: &DesireSet,
        robot: &RobotSnapshot,
    ) -> Result<DesireSet, BehaviorError> {
        let mut desired = DesireSet::new();
        let max_vel = current.max_vel();

        if max_vel.strength() < LIMIT_STRENGTH || max_vel.value() > self.speed_start {
            self.turning = 0.0;
            return Ok(desired);
        }

        if self.turning == 0.0 {
            self.turning = if robot.rot_vel < 0.0 { -1.0 } else { 1.0 };
        }

        let amount = self.turn_amount * self.ramp(max_vel.value());
        desired.set_delta_heading(self.turning * amount, MAX_STRENGTH);
        Ok(desired)
    }

    fn deactivate(&mut self) {
        self.turning = 0.0;
    }
}
