//! # Arbiter Driver
//!
//! 行为仲裁机器人的驱动层：
//! - 读线程：接收数据包并分发给处理器，更新 [`RobotState`]
//! - 控制周期：按固定周期执行行为仲裁、运动学限幅与用户任务，
//!   把结果转换为运动命令发送给控制器
//! - [`Robot`]：对外 API，负责线程生命周期与各类注册
//!
//! # 使用示例
//!
//! ```no_run
//! use arbiter_action::behaviors::ConstantVelocity;
//! use arbiter_driver::RobotBuilder;
//! use std::time::Duration;
//!
//! let robot = RobotBuilder::new()
//!     .period_ms(100)
//!     .connect_tcp("127.0.0.1:8101", Duration::from_secs(2))?;
//!
//! robot.enable_motors(true)?;
//! robot.add_behavior(50, ConstantVelocity::new("cruise", 300.0));
//! robot.run_async()?;
//!
//! std::thread::sleep(Duration::from_secs(5));
//! robot.stop_and_wait(Duration::from_secs(1))?;
//! # Ok::<(), arbiter_driver::DriverError>(())
//! ```

mod builder;
pub mod builtin;
mod config;
mod context;
pub mod cycle;
mod error;
pub mod handlers;
pub mod heartbeat;
pub mod metrics;
pub mod mode;
pub mod pipeline;
mod robot;
pub mod state;

pub use builder::RobotBuilder;
pub use config::RobotConfig;
pub use cycle::{CycleConfig, CycleTask, TaskHandle, TickContext};
pub use error::DriverError;
pub use handlers::{
    DispatchOutcome, HandlerHandle, HandlerOutcome, HandlerRegistry, PacketClass, PacketHandler,
};
pub use heartbeat::ConnectionMonitor;
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use mode::{AtomicCycleStatus, CycleStatus};
pub use pipeline::ReaderConfig;
pub use robot::{Robot, RobotGuard};
pub use state::RobotState;
