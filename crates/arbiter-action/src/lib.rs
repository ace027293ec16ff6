//! # Arbiter Action
//!
//! 基于行为的运动仲裁：每个行为在每个控制周期提交一个带强度的期望集合，
//! 仲裁器把它们合并成一条运动指令。
//!
//! ## 模块
//!
//! - `channel`: 单通道期望（数值 + 强度 + 覆盖策略）
//! - `desired`: 期望集合（17 个通道 + 绝对航向）
//! - `behavior`: 行为 Trait 与行为集合
//! - `resolver`: 优先级 / 平均两种仲裁模式
//! - `command`: 仲裁结果落地的运动指令与运动学上限
//! - `behaviors`: 内置行为
//!
//! ## 使用示例
//!
//! ```rust
//! use arbiter_action::{BehaviorSet, DesireSet, Resolver, RobotSnapshot, from_fn};
//!
//! let mut behaviors = BehaviorSet::new();
//! behaviors.register(10, from_fn("cruise", |_: &DesireSet, _: &RobotSnapshot| {
//!     let mut d = DesireSet::new();
//!     d.set_vel(500.0, 1.0);
//!     Ok(d)
//! }));
//! behaviors.register(90, from_fn("limit", |_: &DesireSet, _: &RobotSnapshot| {
//!     let mut d = DesireSet::new();
//!     d.set_max_vel(300.0, 1.0, true);
//!     Ok(d)
//! }));
//!
//! let mut resolver = Resolver::default();
//! let resolved = resolver.resolve(&mut behaviors, &RobotSnapshot::default());
//! assert_eq!(resolved.vel().value(), 500.0);
//! assert_eq!(resolved.max_vel().value(), 300.0);
//! ```

pub mod behavior;
pub mod behaviors;
pub mod channel;
pub mod command;
pub mod desired;
pub mod math;
pub mod resolver;
pub mod snapshot;

pub use behavior::{
    Behavior, BehaviorError, BehaviorHandle, BehaviorInfo, BehaviorSet, FnBehavior, from_fn,
};
pub use channel::{DesireChannel, MAX_STRENGTH, MIN_STRENGTH, NO_STRENGTH, OverridePolicy};
pub use command::{KinematicLimits, MotionCommand, RotationCommand};
pub use desired::{Channel, DesireSet};
pub use math::{normalize_deg, sub_angle};
pub use resolver::{BehaviorFault, ResolveMode, Resolver};
pub use snapshot::RobotSnapshot;
