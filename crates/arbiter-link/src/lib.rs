//! # Arbiter Link Layer
//!
//! 字节流链路抽象层，提供统一的收发接口：
//! - `tcp`: TCP 连接（仿真器 / 网络串口服务器）
//! - `serial`: 串口（`serial` feature）
//! - `mock`: 内存回环链路（`mock` feature，测试与仿真）
//! - `transport`: 在链路之上完成拆帧 / 组帧，收发完整数据包

use std::time::Duration;
use thiserror::Error;

pub use arbiter_protocol::Packet;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;
pub mod tcp;
pub mod transport;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockLink, MockRemote};
#[cfg(feature = "serial")]
pub use serial::SerialLink;
pub use tcp::TcpLink;
pub use transport::{PacketReceiver, PacketSender, open_transport};

/// 链路层统一错误类型
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(String),
    #[error("Read timeout")]
    Timeout,
    /// 对端关闭连接（EOF）或链路被本地关闭
    #[error("Link disconnected")]
    Disconnected,
}

impl LinkError {
    /// 连接类故障：读线程据此决定停止或重试
    pub fn is_connection_failure(&self) -> bool {
        match self {
            LinkError::Disconnected => true,
            LinkError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
            ),
            LinkError::Device(_) => true,
            LinkError::Timeout => false,
        }
    }
}

/// 链路读端
pub trait RxLink: Send {
    /// 读取可用字节，最多阻塞 `timeout`
    ///
    /// 无数据时返回 `Err(LinkError::Timeout)`；对端关闭时返回 `Err(LinkError::Disconnected)`。
    /// 成功时返回值总是大于 0。
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError>;
}

/// 链路写端
pub trait TxLink: Send {
    /// 一次性写出整块数据
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// 关闭链路，解除读端的阻塞
    fn close(&mut self) {}
}

impl<T: RxLink + ?Sized> RxLink for Box<T> {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        (**self).read(buf, timeout)
    }
}

impl<T: TxLink + ?Sized> TxLink for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        (**self).write_all(bytes)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// 可拆分为独立读写端的链路
pub trait SplittableLink {
    type Rx: RxLink + 'static;
    type Tx: TxLink + 'static;

    fn split(self) -> Result<(Self::Rx, Self::Tx), LinkError>;
}

/// 把 IO 读错误映射为链路错误
pub(crate) fn map_read_error(e: std::io::Error) -> LinkError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => LinkError::Timeout,
        std::io::ErrorKind::UnexpectedEof
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => LinkError::Disconnected,
        _ => LinkError::Io(e),
    }
}
