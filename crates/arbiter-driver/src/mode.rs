//! 控制周期状态
//!
//! `Stopped → Running → Stopping → Stopped`，以原子变量在线程间共享。

use std::sync::atomic::{AtomicU8, Ordering};

/// 控制周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CycleStatus {
    /// 未运行（默认）
    #[default]
    Stopped = 0,
    /// 正在运行
    Running = 1,
    /// 已请求停止，当前周期结束后退出
    Stopping = 2,
}

impl CycleStatus {
    /// 无效值视为 Stopped
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// 控制周期状态（原子版本）
#[derive(Debug, Default)]
pub struct AtomicCycleStatus {
    inner: AtomicU8,
}

impl AtomicCycleStatus {
    pub fn new(status: CycleStatus) -> Self {
        Self {
            inner: AtomicU8::new(status.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> CycleStatus {
        CycleStatus::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, status: CycleStatus, ordering: Ordering) {
        self.inner.store(status.as_u8(), ordering);
    }

    /// 比较并交换，成功时返回 Ok(旧值)
    pub fn compare_exchange(
        &self,
        current: CycleStatus,
        new: CycleStatus,
        success: Ordering,
        failure: Ordering,
    ) -> Result<CycleStatus, CycleStatus> {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .map(CycleStatus::from_u8)
            .map_err(CycleStatus::from_u8)
    }
}
