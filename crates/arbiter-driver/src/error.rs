//! 驱动层错误类型定义

use arbiter_link::LinkError;
use arbiter_protocol::ProtocolError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路错误
    #[error("Link error: {0}")]
    Link(#[from] LinkError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 数据包 ID 已被独占认领
    #[error("Packet id {id:#04x} is already claimed by another handler")]
    HandlerConflict { id: u8 },

    /// 控制周期已在运行
    #[error("Control cycle is already running")]
    AlreadyRunning,

    /// 控制周期未运行
    #[error("Control cycle is not running")]
    NotRunning,

    /// 链路已关闭（已断开或已调用 disconnect）
    #[error("Robot is disconnected")]
    Disconnected,

    /// 线程启动 / 退出失败
    #[error("Thread error: {0}")]
    Thread(String),

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,
}
