use crate::behavior::{Behavior, BehaviorError};
use crate::channel::MAX_STRENGTH;
use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;

/// 恒速直行
pub struct ConstantVelocity {
    name: String,
    vel: f64,
}

impl ConstantVelocity {
    pub fn new(name: impl Into<String>, vel: f64) -> Self {
        Self {
            name: name.into(),
            vel,
        }
    }

    pub fn set_vel(&mut self, vel: f64) {
        self.vel = vel;
    }
}

impl Behavior for ConstantVelocity {
    fn name(&self) -> &str {
        &self.name
    }

    fn fire(&mut self, _: &DesireSet, _: &RobotSnapshot) -> Result<DesireSet, BehaviorError> {
        let mut desired = DesireSet::new();
        desired.set_vel(self.vel, MAX_STRENGTH);
        desired.set_delta_heading(0.0, MAX_STRENGTH);
        Ok(desired)
    }
}
