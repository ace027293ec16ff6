//! 字节流拆帧
//!
//! 输入任意切分的字节块，输出校验通过的完整数据包。
//! 长度非法或校验失败时只跳过一个字节，从下一个同步头重新对齐，
//! 这样坏帧不会吞掉紧随其后的合法帧。

use crate::ProtocolError;
use crate::packet::{
    CHECKSUM_LEN, HEADER_LEN, MAX_LENGTH_FIELD, MIN_LENGTH_FIELD, Packet, SYNC_BYTE_1, SYNC_BYTE_2,
    checksum,
};
use bytes::{Buf, BytesMut};
use tracing::{debug, trace};

/// 拆帧统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeframerStats {
    /// 成功解析的帧数
    pub frames_ok: u64,
    /// 校验失败丢弃的帧数
    pub checksum_errors: u64,
    /// 长度字段非法丢弃的帧数
    pub length_errors: u64,
    /// 为重新同步跳过的字节数
    pub bytes_skipped: u64,
}

impl DeframerStats {
    /// 丢弃的坏帧总数
    pub fn dropped(&self) -> u64 {
        self.checksum_errors + self.length_errors
    }
}

/// 拆帧器
#[derive(Debug, Default)]
pub struct Deframer {
    buffer: BytesMut,
    stats: DeframerStats,
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            stats: DeframerStats::default(),
        }
    }

    /// 追加收到的原始字节
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// 缓冲区中尚未消费的字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> DeframerStats {
        self.stats
    }

    /// 丢弃缓冲区（连接重建时调用）
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// 取出下一个完整且校验通过的数据包
    ///
    /// 缓冲区数据不足时返回 `None`，坏帧被静默丢弃并计入统计。
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            if !self.align_to_sync() {
                return None;
            }
            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let length_field = u16::from_le_bytes([self.buffer[2], self.buffer[3]]);
            if !(MIN_LENGTH_FIELD..=MAX_LENGTH_FIELD).contains(&length_field) {
                debug!("Dropping frame: {}", ProtocolError::InvalidLength(length_field));
                self.stats.length_errors += 1;
                // 不信任损坏的长度字段，只跳过第一个同步字节
                self.skip(1);
                continue;
            }

            let total_len = HEADER_LEN + length_field as usize;
            if self.buffer.len() < total_len {
                return None;
            }

            let body_end = total_len - CHECKSUM_LEN;
            let expected = checksum(&self.buffer[..body_end]);
            let actual = u16::from_le_bytes([self.buffer[body_end], self.buffer[body_end + 1]]);
            if expected != actual {
                debug!(
                    "Dropping frame: {}",
                    ProtocolError::ChecksumMismatch { expected, actual }
                );
                self.stats.checksum_errors += 1;
                self.skip(1);
                continue;
            }

            let mut frame = self.buffer.split_to(total_len);
            frame.advance(HEADER_LEN);
            let id = frame[0];
            frame.advance(1);
            frame.truncate(frame.len() - CHECKSUM_LEN);
            self.stats.frames_ok += 1;
            trace!("Deframed packet id=0x{:02X} len={}", id, frame.len());

            // 负载长度已由长度字段上限保证
            return Some(Packet::from_parts(id, frame.freeze()));
        }
    }

    /// 丢弃同步头之前的字节；缓冲区中没有完整同步头时返回 false
    fn align_to_sync(&mut self) -> bool {
        let found = self
            .buffer
            .windows(2)
            .position(|w| w[0] == SYNC_BYTE_1 && w[1] == SYNC_BYTE_2);

        match found {
            Some(0) => true,
            Some(idx) => {
                self.skip(idx);
                true
            },
            None => {
                // 保留末尾可能是半个同步头的字节
                let keep = usize::from(self.buffer.last() == Some(&SYNC_BYTE_1));
                let drop = self.buffer.len() - keep;
                self.skip(drop);
                false
            },
        }
    }

    fn skip(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.buffer.advance(n);
        self.stats.bytes_skipped += n as u64;
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// 不含同步字节的垃圾前缀之后，合法帧都能被恢复
        #[test]
        fn valid_frame_survives_garbage_prefix(
            garbage in proptest::collection::vec(0u8..SYNC_BYTE_1, 0..64),
            id in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..32),
        ) {
            let mut deframer = Deframer::new();
            deframer.push(&garbage);
            let packet = Packet::new(id, payload.clone()).unwrap();
            deframer.push(&packet.encode());

            let mut found = false;
            while let Some(p) = deframer.next_packet() {
                if p == packet {
                    found = true;
                }
            }
            prop_assert!(found);
        }
    }
}
