//! 数据包收发
//!
//! 在字节流链路之上完成组帧与拆帧。连接类故障原样上抛，
//! 是否重试由调用方（读线程）决定。

use crate::{LinkError, RxLink, SplittableLink, TxLink};
use arbiter_protocol::{Deframer, DeframerStats, Packet};
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tracing::trace;

const READ_CHUNK: usize = 512;

/// 拆分链路并创建收发两端
pub fn open_transport<L: SplittableLink>(
    link: L,
) -> Result<(PacketReceiver<L::Rx>, PacketSender<L::Tx>), LinkError> {
    let (rx, tx) = link.split()?;
    Ok((PacketReceiver::new(rx), PacketSender::new(tx)))
}

/// 接收端：读取字节并拆出完整、校验通过的数据包
pub struct PacketReceiver<R> {
    link: R,
    deframer: Deframer,
    scratch: Box<[u8; READ_CHUNK]>,
}

impl<R: RxLink> PacketReceiver<R> {
    pub fn new(link: R) -> Self {
        Self {
            link,
            deframer: Deframer::new(),
            scratch: Box::new([0u8; READ_CHUNK]),
        }
    }

    /// 等待一个完整数据包，最多阻塞 `timeout`
    ///
    /// 坏帧在拆帧器内部丢弃，不会作为错误返回。
    pub fn receive(&mut self, timeout: Duration) -> Result<Packet, LinkError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(packet) = self.deframer.next_packet() {
                return Ok(packet);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LinkError::Timeout);
            }

            let n = self.link.read(&mut self.scratch[..], remaining)?;
            trace!("Link read {} bytes", n);
            self.deframer.push(&self.scratch[..n]);
        }
    }

    /// 拆帧统计（坏帧 / 跳过字节数）
    pub fn stats(&self) -> DeframerStats {
        self.deframer.stats()
    }
}

/// 发送端：组帧后单次写出
pub struct PacketSender<T> {
    link: T,
    buf: BytesMut,
    packets_sent: u64,
}

impl<T: TxLink> PacketSender<T> {
    pub fn new(link: T) -> Self {
        Self {
            link,
            buf: BytesMut::with_capacity(256),
            packets_sent: 0,
        }
    }

    pub fn send(&mut self, packet: &Packet) -> Result<(), LinkError> {
        self.send_batch(std::slice::from_ref(packet))
    }

    /// 多个数据包合并为一次写入
    pub fn send_batch(&mut self, packets: &[Packet]) -> Result<(), LinkError> {
        if packets.is_empty() {
            return Ok(());
        }
        self.buf.clear();
        for packet in packets {
            packet.encode_into(&mut self.buf);
        }
        self.link.write_all(&self.buf)?;
        self.packets_sent += packets.len() as u64;
        Ok(())
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// 关闭链路，解除读端阻塞
    pub fn close(&mut self) {
        self.link.close();
    }
}
