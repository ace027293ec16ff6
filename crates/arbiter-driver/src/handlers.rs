//! 数据包处理器注册表
//!
//! 读线程收到数据包后在持有状态锁的情况下调用 [`HandlerRegistry::dispatch`]：
//!
//! - 按注册顺序调用匹配的处理器，直到某个处理器返回 [`HandlerOutcome::Consumed`]
//! - 调试 / 警告类数据包是非独占的：所有匹配的处理器都会收到
//! - 通过 [`HandlerRegistry::claim`] 独占认领的 ID 只交给认领者
//!
//! # 使用示例
//!
//! ```rust
//! use arbiter_driver::handlers::{HandlerOutcome, HandlerRegistry, PacketClass};
//! use arbiter_driver::RobotState;
//! use arbiter_protocol::Packet;
//!
//! let mut registry = HandlerRegistry::new();
//! registry.add(PacketClass::Id(0x90), |_p: &Packet, state: &mut RobotState| {
//!     state.safety_warnings += 1;
//!     HandlerOutcome::Consumed
//! });
//!
//! let mut state = RobotState::new();
//! assert!(registry.dispatch(&Packet::empty(0x90), &mut state).is_consumed());
//! ```

use crate::error::DriverError;
use crate::state::RobotState;
use arbiter_protocol::{Packet, PacketKind};
use tracing::debug;

/// 处理器匹配的数据包类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketClass {
    /// 指定 ID
    Id(u8),
    /// 固件调试消息
    Debug,
    /// 安全警告
    Warning,
    /// 任意数据包
    Any,
}

impl PacketClass {
    fn matches(self, id: u8, kind: PacketKind) -> bool {
        match self {
            PacketClass::Id(want) => want == id,
            PacketClass::Debug => kind == PacketKind::Debug,
            PacketClass::Warning => kind == PacketKind::Warning,
            PacketClass::Any => true,
        }
    }
}

/// 处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// 已处理，停止向后续处理器分发
    Consumed,
    /// 未处理，继续分发
    PassThrough,
}

/// 数据包处理器 Trait
///
/// 在读线程中、持有状态锁时调用，实现应尽快返回。
pub trait PacketHandler: Send + Sync {
    fn handle(&self, packet: &Packet, state: &mut RobotState) -> HandlerOutcome;
}

impl<F> PacketHandler for F
where
    F: Fn(&Packet, &mut RobotState) -> HandlerOutcome + Send + Sync,
{
    fn handle(&self, packet: &Packet, state: &mut RobotState) -> HandlerOutcome {
        self(packet, state)
    }
}

/// 处理器句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerHandle(u64);

/// 一次分发的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 至少一个处理器返回了 Consumed
    Consumed,
    /// 没有处理器认领
    Unhandled,
}

impl DispatchOutcome {
    pub fn is_consumed(self) -> bool {
        self == DispatchOutcome::Consumed
    }
}

struct HandlerEntry {
    handle: HandlerHandle,
    class: PacketClass,
    exclusive: bool,
    handler: Box<dyn PacketHandler>,
}

/// 处理器注册表
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<HandlerEntry>,
    next_id: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册非独占处理器
    pub fn add(&mut self, class: PacketClass, handler: impl PacketHandler + 'static) -> HandlerHandle {
        self.insert(class, false, Box::new(handler))
    }

    /// 独占认领一个 ID
    ///
    /// 已被其他处理器独占认领时返回 [`DriverError::HandlerConflict`]。
    pub fn claim(
        &mut self,
        id: u8,
        handler: impl PacketHandler + 'static,
    ) -> Result<HandlerHandle, DriverError> {
        if self.claimed_by(id).is_some() {
            return Err(DriverError::HandlerConflict { id });
        }
        Ok(self.insert(PacketClass::Id(id), true, Box::new(handler)))
    }

    /// 注销处理器，句柄不存在时返回 false
    pub fn remove(&mut self, handle: HandlerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        before != self.entries.len()
    }

    /// 独占认领 `id` 的处理器
    pub fn claimed_by(&self, id: u8) -> Option<HandlerHandle> {
        self.entries
            .iter()
            .find(|e| e.exclusive && e.class == PacketClass::Id(id))
            .map(|e| e.handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 分发一个数据包
    pub fn dispatch(&self, packet: &Packet, state: &mut RobotState) -> DispatchOutcome {
        let id = packet.id();
        let kind = PacketKind::from_id(id);

        if let Some(owner) = self
            .entries
            .iter()
            .find(|e| e.exclusive && e.class == PacketClass::Id(id))
        {
            return match owner.handler.handle(packet, state) {
                HandlerOutcome::Consumed => DispatchOutcome::Consumed,
                HandlerOutcome::PassThrough => DispatchOutcome::Unhandled,
            };
        }

        let mut consumed = false;
        for entry in self.entries.iter().filter(|e| e.class.matches(id, kind)) {
            if entry.handler.handle(packet, state) == HandlerOutcome::Consumed {
                consumed = true;
                if !kind.is_non_exclusive() {
                    break;
                }
            }
        }

        if consumed {
            DispatchOutcome::Consumed
        } else {
            DispatchOutcome::Unhandled
        }
    }

    fn insert(
        &mut self,
        class: PacketClass,
        exclusive: bool,
        handler: Box<dyn PacketHandler>,
    ) -> HandlerHandle {
        let handle = HandlerHandle(self.next_id);
        self.next_id += 1;
        debug!(
            "Registered packet handler {:?} for {:?} (exclusive: {})",
            handle, class, exclusive
        );
        self.entries.push(HandlerEntry {
            handle,
            class,
            exclusive,
            handler,
        });
        handle
    }
}
