//! Arbiter SDK - 行为仲裁移动机器人 Rust SDK
//!
//! # 架构设计
//!
//! 本 SDK 采用分层架构，从底层到高层：
//!
//! - **协议层** (`protocol`): 数据包格式、命令编码、状态包解码
//! - **链路层** (`link`): TCP / 串口 / 内存回环链路与拆帧
//! - **行为层** (`action`): 期望通道、期望集合、仲裁器与内置行为
//! - **驱动层** (`driver`): 读线程、控制周期、数据包分发与 `Robot` 对外 API
//!
//! # 快速开始
//!
//! ```no_run
//! use arbiter_sdk::prelude::*;
//! use std::time::Duration;
//!
//! arbiter_sdk::init_logging();
//!
//! let robot = RobotBuilder::new()
//!     .connect_tcp("127.0.0.1:8101", Duration::from_secs(2))?;
//! robot.enable_motors(true)?;
//! robot.add_behavior(90, Stop::new("stop"));
//! robot.run_async()?;
//! # Ok::<(), DriverError>(())
//! ```

pub mod logging;
pub mod prelude;
#[cfg(feature = "sim")]
pub mod sim;

/// 协议层
pub mod protocol {
    pub use arbiter_protocol::*;
}

/// 链路层
pub mod link {
    pub use arbiter_link::*;
}

/// 行为层
pub mod action {
    pub use arbiter_action::*;
}

/// 驱动层
pub mod driver {
    pub use arbiter_driver::*;
}

pub use logging::{init_logging, init_logging_with};

pub use arbiter_action::{
    Behavior, BehaviorError, BehaviorHandle, DesireSet, MotionCommand, ResolveMode, RobotSnapshot,
};
pub use arbiter_driver::{DriverError, Robot, RobotBuilder, RobotConfig};
pub use arbiter_link::LinkError;
pub use arbiter_protocol::{Packet, ProtocolError};
#[cfg(feature = "sim")]
pub use sim::{SimHandle, SimulatedController};
