//! 内存回环链路
//!
//! `MockLink` 交给驱动使用，`MockRemote` 扮演控制器一端：
//! 注入原始字节 / 数据包，读取驱动发出的数据包，或模拟断线。

use crate::{LinkError, RxLink, SplittableLink, TxLink};
use arbiter_protocol::{Deframer, Packet};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::{Duration, Instant};

/// 链路消息：`None` 表示本地关闭
type Chunk = Option<Vec<u8>>;

pub struct MockLink {
    inbound_rx: Receiver<Chunk>,
    inbound_tx: Sender<Chunk>,
    outbound_tx: Sender<Vec<u8>>,
}

/// 控制器一端
pub struct MockRemote {
    inbound_tx: Option<Sender<Chunk>>,
    outbound_rx: Receiver<Vec<u8>>,
    deframer: Deframer,
}

impl MockLink {
    /// 创建一对相连的端点
    pub fn pair() -> (MockLink, MockRemote) {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        (
            MockLink {
                inbound_rx,
                inbound_tx: inbound_tx.clone(),
                outbound_tx,
            },
            MockRemote {
                inbound_tx: Some(inbound_tx),
                outbound_rx,
                deframer: Deframer::new(),
            },
        )
    }
}

impl SplittableLink for MockLink {
    type Rx = MockRx;
    type Tx = MockTx;

    fn split(self) -> Result<(MockRx, MockTx), LinkError> {
        let close_tx = self.inbound_tx;
        Ok((
            MockRx {
                rx: self.inbound_rx,
                pending: Vec::new(),
                closed: false,
            },
            MockTx {
                tx: Some(self.outbound_tx),
                close_tx: Some(close_tx),
            },
        ))
    }
}

pub struct MockRx {
    rx: Receiver<Chunk>,
    pending: Vec<u8>,
    closed: bool,
}

impl RxLink for MockRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        if self.pending.is_empty() {
            if self.closed {
                return Err(LinkError::Disconnected);
            }
            match self.rx.recv_timeout(timeout) {
                Ok(Some(bytes)) => self.pending = bytes,
                Ok(None) => {
                    self.closed = true;
                    return Err(LinkError::Disconnected);
                },
                Err(RecvTimeoutError::Timeout) => return Err(LinkError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(LinkError::Disconnected),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        if n == 0 {
            return Err(LinkError::Timeout);
        }
        Ok(n)
    }
}

pub struct MockTx {
    tx: Option<Sender<Vec<u8>>>,
    close_tx: Option<Sender<Chunk>>,
}

impl TxLink for MockTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let tx = self.tx.as_ref().ok_or(LinkError::Disconnected)?;
        tx.send(bytes.to_vec()).map_err(|_| LinkError::Disconnected)
    }

    fn close(&mut self) {
        self.tx = None;
        if let Some(close_tx) = self.close_tx.take() {
            let _ = close_tx.send(None);
        }
    }
}

impl MockRemote {
    /// 注入原始字节（可以是残帧或坏帧）
    pub fn send_bytes(&self, bytes: &[u8]) {
        if let Some(tx) = &self.inbound_tx {
            let _ = tx.send(Some(bytes.to_vec()));
        }
    }

    /// 注入完整数据包
    pub fn send_packet(&self, packet: &Packet) {
        self.send_bytes(&packet.encode());
    }

    /// 模拟对端断线
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.inbound_tx.take() {
            // 读端把 `None` 视为断线，不依赖所有 Sender 都被释放
            let _ = tx.send(None);
        }
    }

    /// 读取驱动已发出的全部数据包（非阻塞）
    pub fn drain_packets(&mut self) -> Vec<Packet> {
        while let Ok(bytes) = self.outbound_rx.try_recv() {
            self.deframer.push(&bytes);
        }
        std::iter::from_fn(|| self.deframer.next_packet()).collect()
    }

    /// 等待驱动发出满足条件的数据包
    pub fn wait_for_packet(
        &mut self,
        timeout: Duration,
        mut predicate: impl FnMut(&Packet) -> bool,
    ) -> Option<Packet> {
        let deadline = Instant::now() + timeout;
        loop {
            while let Some(packet) = self.deframer.next_packet() {
                if predicate(&packet) {
                    return Some(packet);
                }
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            match self.outbound_rx.recv_timeout(remaining) {
                Ok(bytes) => self.deframer.push(&bytes),
                Err(_) => return None,
            }
        }
    }

    /// 驱动一次写出的原始字节块（测试批量写入）
    pub fn recv_chunk(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.outbound_rx.recv_timeout(timeout).ok()
    }
}

impl Drop for MockRemote {
    fn drop(&mut self) {
        self.disconnect();
    }
}
