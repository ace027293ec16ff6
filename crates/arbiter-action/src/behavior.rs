//! 行为接口与行为集合
//!
//! 行为是独立的控制策略，每个控制周期提交一个 [`DesireSet`]。
//! [`BehaviorSet`] 以句柄索引的方式持有所有行为，按优先级从高到低排列，
//! 同优先级保持注册顺序。
//!
//! # 使用示例
//!
//! ```rust
//! use arbiter_action::{BehaviorSet, DesireSet, RobotSnapshot, from_fn};
//!
//! let mut set = BehaviorSet::new();
//! let handle = set.register(
//!     50,
//!     from_fn("cruise", |_current: &DesireSet, _robot: &RobotSnapshot| {
//!         let mut d = DesireSet::new();
//!         d.set_vel(300.0, 1.0);
//!         Ok(d)
//!     }),
//! );
//! assert_eq!(set.find("cruise"), Some(handle));
//! ```

use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;
use thiserror::Error;
use tracing::debug;

/// 行为执行错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BehaviorError {
    /// 行为主动报告失败
    #[error("Behavior failed: {0}")]
    Failed(String),

    /// 行为执行时 panic（已被隔离）
    #[error("Behavior panicked: {0}")]
    Panicked(String),

    /// 行为所需的输入暂不可用（例如尚未收到状态包）
    #[error("Input unavailable: {0}")]
    Unavailable(&'static str),
}

/// 行为 Trait
pub trait Behavior: Send {
    /// 行为名称（日志与查找使用）
    fn name(&self) -> &str;

    /// 产生本周期的期望
    ///
    /// # 参数
    ///
    /// - `current`: 更高优先级行为已合并出的期望
    /// - `robot`: 本周期开始时的机器人状态快照
    fn fire(&mut self, current: &DesireSet, robot: &RobotSnapshot)
    -> Result<DesireSet, BehaviorError>;

    /// 被激活时调用
    fn activate(&mut self) {}

    /// 被停用时调用
    fn deactivate(&mut self) {}
}

/// 闭包行为
pub struct FnBehavior<F> {
    name: String,
    f: F,
}

/// 用闭包构造行为
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnBehavior<F>
where
    F: FnMut(&DesireSet, &RobotSnapshot) -> Result<DesireSet, BehaviorError> + Send,
{
    FnBehavior {
        name: name.into(),
        f,
    }
}

impl<F> Behavior for FnBehavior<F>
where
    F: FnMut(&DesireSet, &RobotSnapshot) -> Result<DesireSet, BehaviorError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn fire(
        &mut self,
        current: &DesireSet,
        robot: &RobotSnapshot,
    ) -> Result<DesireSet, BehaviorError> {
        (self.f)(current, robot)
    }
}

/// 行为句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BehaviorHandle(u64);

impl BehaviorHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// 行为条目信息（只读）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorInfo {
    pub handle: BehaviorHandle,
    pub name: String,
    pub priority: i32,
    pub active: bool,
}

pub(crate) struct BehaviorEntry {
    pub(crate) handle: BehaviorHandle,
    pub(crate) priority: i32,
    pub(crate) active: bool,
    pub(crate) behavior: Box<dyn Behavior>,
}

/// 行为集合
#[derive(Default)]
pub struct BehaviorSet {
    entries: Vec<BehaviorEntry>,
    next_id: u64,
}

impl BehaviorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册行为（默认激活），返回句柄
    ///
    /// 优先级越高越先执行；同优先级按注册顺序执行。
    pub fn register(&mut self, priority: i32, behavior: impl Behavior + 'static) -> BehaviorHandle {
        self.register_boxed(priority, Box::new(behavior))
    }

    pub fn register_boxed(&mut self, priority: i32, behavior: Box<dyn Behavior>) -> BehaviorHandle {
        let handle = BehaviorHandle(self.next_id);
        self.next_id += 1;

        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        debug!(
            "Registered behavior '{}' (priority {}, handle {})",
            behavior.name(),
            priority,
            handle.0
        );
        self.entries.insert(
            pos,
            BehaviorEntry {
                handle,
                priority,
                active: true,
                behavior,
            },
        );
        handle
    }

    /// 注销行为，返回行为本身
    pub fn unregister(&mut self, handle: BehaviorHandle) -> Option<Box<dyn Behavior>> {
        let pos = self.entries.iter().position(|e| e.handle == handle)?;
        let entry = self.entries.remove(pos);
        debug!("Unregistered behavior '{}'", entry.behavior.name());
        Some(entry.behavior)
    }

    /// 激活 / 停用行为，状态切换时调用行为的回调
    ///
    /// 句柄不存在时返回 false。
    pub fn set_active(&mut self, handle: BehaviorHandle, active: bool) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.handle == handle) else {
            return false;
        };
        if entry.active != active {
            entry.active = active;
            if active {
                entry.behavior.activate();
            } else {
                entry.behavior.deactivate();
            }
        }
        true
    }

    pub fn is_active(&self, handle: BehaviorHandle) -> Option<bool> {
        self.entries
            .iter()
            .find(|e| e.handle == handle)
            .map(|e| e.active)
    }

    /// 按名称查找第一个匹配的行为
    pub fn find(&self, name: &str) -> Option<BehaviorHandle> {
        self.entries
            .iter()
            .find(|e| e.behavior.name() == name)
            .map(|e| e.handle)
    }

    /// 按执行顺序列出所有行为
    pub fn list(&self) -> Vec<BehaviorInfo> {
        self.entries
            .iter()
            .map(|e| BehaviorInfo {
                handle: e.handle,
                name: e.behavior.name().to_string(),
                priority: e.priority,
                active: e.active,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按执行顺序遍历已激活的行为
    pub(crate) fn active_mut(&mut self) -> impl Iterator<Item = &mut BehaviorEntry> {
        self.entries.iter_mut().filter(|e| e.active)
    }
}
