//! TCP 链路
//!
//! 用于连接仿真器或网络串口服务器。拆分时通过 `try_clone` 得到两个
//! 共享同一 socket 的句柄，写端 `close()` 执行 `shutdown` 以唤醒读端。
//! 写操作带超时：远端停止读取时 `write_all` 返回 `TimedOut`，不会无限阻塞。

use crate::{LinkError, RxLink, SplittableLink, TxLink, map_read_error};
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, info};

/// `set_read_timeout` / `set_write_timeout` 不接受零时长
const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// 默认写超时
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// 连接到远端
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, LinkError> {
        let mut last_err = None;
        for addr in addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    info!("TCP link connected to {}", addr);
                    return Self::from_stream(stream);
                },
                Err(e) => {
                    debug!("TCP connect to {} failed: {}", addr, e);
                    last_err = Some(e);
                },
            }
        }
        Err(last_err
            .map(LinkError::Io)
            .unwrap_or_else(|| LinkError::Device("no address resolved".into())))
    }

    /// 包装已建立的连接
    pub fn from_stream(stream: TcpStream) -> Result<Self, LinkError> {
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(DEFAULT_WRITE_TIMEOUT))?;
        Ok(Self { stream })
    }

    /// 设置写超时（拆分后两个句柄共享）
    pub fn set_write_timeout(&self, timeout: Duration) -> Result<(), LinkError> {
        self.stream.set_write_timeout(Some(timeout.max(MIN_TIMEOUT)))?;
        Ok(())
    }
}

impl SplittableLink for TcpLink {
    type Rx = TcpRx;
    type Tx = TcpTx;

    fn split(self) -> Result<(TcpRx, TcpTx), LinkError> {
        let rx = self.stream.try_clone()?;
        Ok((
            TcpRx {
                stream: rx,
                current_timeout: None,
            },
            TcpTx {
                stream: self.stream,
            },
        ))
    }
}

pub struct TcpRx {
    stream: TcpStream,
    current_timeout: Option<Duration>,
}

impl RxLink for TcpRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        let timeout = timeout.max(MIN_TIMEOUT);
        if self.current_timeout != Some(timeout) {
            self.stream.set_read_timeout(Some(timeout))?;
            self.current_timeout = Some(timeout);
        }

        match self.stream.read(buf) {
            Ok(0) => Err(LinkError::Disconnected),
            Ok(n) => Ok(n),
            Err(e) => Err(map_read_error(e)),
        }
    }
}

pub struct TcpTx {
    stream: TcpStream,
}

impl TxLink for TcpTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.stream.write_all(bytes).map_err(|e| match map_read_error(e) {
            LinkError::Timeout => LinkError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)),
            other => other,
        })
    }

    fn close(&mut self) {
        // 已关闭时忽略错误
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (TcpLink, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let link = TcpLink::connect(addr, Duration::from_secs(1)).unwrap();
        (link, accept.join().unwrap())
    }

    #[test]
    fn test_tcp_read_write() {
        let (link, mut remote) = pair();
        let (mut rx, mut tx) = link.split().unwrap();

        tx.write_all(&[1, 2, 3]).unwrap();
        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3]);

        remote.write_all(&[9, 8]).unwrap();
        let mut buf = [0u8; 16];
        let n = rx.read(&mut buf, Duration::from_millis(500)).unwrap();
        assert_eq!(&buf[..n], &[9, 8]);
    }

    #[test]
    fn test_tcp_read_timeout() {
        let (link, _remote) = pair();
        let (mut rx, _tx) = link.split().unwrap();
        let mut buf = [0u8; 8];
        assert!(matches!(
            rx.read(&mut buf, Duration::from_millis(10)),
            Err(LinkError::Timeout)
        ));
    }

    #[test]
    fn test_tcp_remote_close_is_disconnect() {
        let (link, remote) = pair();
        let (mut rx, _tx) = link.split().unwrap();
        drop(remote);
        let mut buf = [0u8; 8];
        assert!(matches!(
            rx.read(&mut buf, Duration::from_millis(500)),
            Err(LinkError::Disconnected)
        ));
    }

    #[test]
    fn test_tcp_write_times_out_when_peer_stops_reading() {
        let (link, _remote) = pair();
        link.set_write_timeout(Duration::from_millis(100)).unwrap();
        let (_rx, mut tx) = link.split().unwrap();

        let chunk = vec![0xA5u8; 64 * 1024];
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        let err = loop {
            assert!(
                std::time::Instant::now() < deadline,
                "write_all kept succeeding against a peer that never reads"
            );
            if let Err(e) = tx.write_all(&chunk) {
                break e;
            }
        };
        match err {
            LinkError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::TimedOut),
            other => panic!("Expected Io(TimedOut), got {:?}", other),
        }
    }

    #[test]
    fn test_tcp_close_unblocks_reader() {
        let (link, _remote) = pair();
        let (mut rx, mut tx) = link.split().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = [0u8; 8];
            loop {
                match rx.read(&mut buf, Duration::from_millis(50)) {
                    Err(LinkError::Timeout) => continue,
                    other => return other.map(|_| ()),
                }
            }
        });
        thread::sleep(Duration::from_millis(20));
        tx.close();
        assert!(reader.join().unwrap().is_err());
    }
}
