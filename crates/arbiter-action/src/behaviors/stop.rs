use crate::behavior::{Behavior, BehaviorError};
use crate::channel::MAX_STRENGTH;
use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;

/// 停车
///
/// 以最大强度请求平移、旋转和横向速度为 0。
pub struct Stop {
    name: String,
}

impl Stop {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for Stop {
    fn default() -> Self {
        Self::new("stop")
    }
}

impl Behavior for Stop {
    fn name(&self) -> &str {
        &self.name
    }

    fn fire(&mut self, _: &DesireSet, _: &RobotSnapshot) -> Result<DesireSet, BehaviorError> {
        let mut desired = DesireSet::new();
        desired.set_vel(0.0, MAX_STRENGTH);
        desired.set_rot_vel(0.0, MAX_STRENGTH);
        desired.set_left_lat_vel(0.0, MAX_STRENGTH);
        Ok(desired)
    }
}
