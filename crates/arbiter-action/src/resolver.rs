//! 仲裁器
//!
//! 每个控制周期调用一次 [`Resolver::resolve`]：按优先级依次执行已激活的行为，
//! 把每个行为的期望并入累加器（或按共识模式平均），得到本周期的最终期望。
//!
//! 单个行为返回错误或 panic 时只记录日志，视为空贡献，仲裁不会中断。

use crate::behavior::{BehaviorError, BehaviorHandle, BehaviorSet};
use crate::desired::DesireSet;
use crate::snapshot::RobotSnapshot;
use smallvec::SmallVec;
use std::panic::{self, AssertUnwindSafe};
use tracing::{trace, warn};

/// 仲裁模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolveMode {
    /// 按优先级顺序合并，先执行的行为优先
    #[default]
    Priority,
    /// 三阶段平均，所有行为平等
    Average,
}

/// 一次行为故障记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorFault {
    pub handle: BehaviorHandle,
    pub error: BehaviorError,
}

/// 仲裁器
#[derive(Debug, Default)]
pub struct Resolver {
    mode: ResolveMode,
    last: DesireSet,
    last_faults: SmallVec<[BehaviorFault; 2]>,
    fault_count: u64,
    resolve_count: u64,
}

impl Resolver {
    pub fn new(mode: ResolveMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> ResolveMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ResolveMode) {
        self.mode = mode;
    }

    /// 执行一次仲裁，返回本周期的最终期望
    pub fn resolve(&mut self, behaviors: &mut BehaviorSet, robot: &RobotSnapshot) -> &DesireSet {
        self.last.reset();
        self.last_faults.clear();
        self.resolve_count += 1;

        match self.mode {
            ResolveMode::Priority => {
                for entry in behaviors.active_mut() {
                    let Some(desired) = fire_isolated(
                        entry.behavior.as_mut(),
                        &self.last,
                        robot,
                        entry.handle,
                        &mut self.last_faults,
                    ) else {
                        continue;
                    };
                    self.last.merge(&desired);
                }
            },
            ResolveMode::Average => {
                let empty = DesireSet::new();
                self.last.start_average();
                for entry in behaviors.active_mut() {
                    let Some(desired) = fire_isolated(
                        entry.behavior.as_mut(),
                        &empty,
                        robot,
                        entry.handle,
                        &mut self.last_faults,
                    ) else {
                        continue;
                    };
                    self.last.add_average(&desired);
                }
                self.last.end_average();
            },
        }

        self.fault_count += self.last_faults.len() as u64;
        trace!("Resolved cycle {}: {}", robot.cycle, self.last);
        &self.last
    }

    /// 最近一次仲裁结果
    pub fn last_resolved(&self) -> &DesireSet {
        &self.last
    }

    /// 最近一次仲裁中出错的行为
    pub fn last_faults(&self) -> &[BehaviorFault] {
        &self.last_faults
    }

    /// 累计故障次数
    pub fn fault_count(&self) -> u64 {
        self.fault_count
    }

    pub fn resolve_count(&self) -> u64 {
        self.resolve_count
    }
}

/// 执行单个行为并做合并前处理，出错时返回 None
fn fire_isolated(
    behavior: &mut dyn crate::behavior::Behavior,
    current: &DesireSet,
    robot: &RobotSnapshot,
    handle: BehaviorHandle,
    faults: &mut SmallVec<[BehaviorFault; 2]>,
) -> Option<DesireSet> {
    let result = panic::catch_unwind(AssertUnwindSafe(|| behavior.fire(current, robot)))
        .unwrap_or_else(|payload| Err(BehaviorError::Panicked(panic_message(payload.as_ref()))));

    match result {
        Ok(mut desired) => {
            desired.account_for_heading(robot.heading);
            desired.sanity_check(behavior.name());
            desired.log_desired(behavior.name());
            Some(desired)
        },
        Err(error) => {
            warn!(
                "Behavior '{}' faulted in cycle {}: {}",
                behavior.name(),
                robot.cycle,
                error
            );
            faults.push(BehaviorFault { handle, error });
            None
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
