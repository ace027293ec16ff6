//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use arbiter_sdk::prelude::*;
//! ```

// 驱动层
pub use arbiter_driver::{
    CycleConfig, CycleStatus, HandlerOutcome, PacketClass, ReaderConfig, Robot, RobotBuilder,
    RobotConfig, RobotState, TickContext,
};

// 行为层
pub use arbiter_action::behaviors::{
    ConstantVelocity, MovementParameters, MovementParams, Stop, TurnOnLimit,
};
pub use arbiter_action::{
    Behavior, BehaviorError, BehaviorHandle, Channel, DesireSet, KinematicLimits, MAX_STRENGTH,
    MotionCommand, ResolveMode, RobotSnapshot, RotationCommand, from_fn,
};

// 协议层
pub use arbiter_protocol::Packet;

// 错误类型
pub use arbiter_driver::DriverError;
pub use arbiter_link::LinkError;
pub use arbiter_protocol::ProtocolError;
