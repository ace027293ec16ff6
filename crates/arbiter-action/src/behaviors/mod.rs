//! 内置行为

mod constant_velocity;
mod movement_parameters;
mod stop;
mod turn_on_limit;

pub use constant_velocity::ConstantVelocity;
pub use movement_parameters::{MovementParameters, MovementParams};
pub use stop::Stop;
pub use turn_on_limit::TurnOnLimit;
