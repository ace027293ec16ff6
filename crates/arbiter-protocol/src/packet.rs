//! 数据包模型与帧编码
//!
//! `Packet` 是协议层与链路层之间的中间抽象：链路层只搬运字节，
//! 协议层负责把字节组装成带校验的帧。

use crate::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};

/// 帧头同步字节
pub const SYNC_BYTE_1: u8 = 0xFA;
pub const SYNC_BYTE_2: u8 = 0xFB;

/// 帧头长度（同步字节 2 + 长度字段 2）
pub const HEADER_LEN: usize = 4;
/// 校验和长度
pub const CHECKSUM_LEN: usize = 2;
/// 最大负载长度（控制器接收缓冲区限制）
pub const MAX_PAYLOAD_LEN: usize = 240;
/// 长度字段允许的最小值（仅 ID + 校验和）
pub const MIN_LENGTH_FIELD: u16 = 1 + CHECKSUM_LEN as u16;
/// 长度字段允许的最大值
pub const MAX_LENGTH_FIELD: u16 = (1 + MAX_PAYLOAD_LEN + CHECKSUM_LEN) as u16;

/// 计算帧校验和
///
/// 按大端字对做 16 位回绕累加，奇数长度时最后一个字节异或进结果。
/// 覆盖范围：帧头到负载末尾（不含校验和本身）。
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u16 = 0;
    let mut pairs = data.chunks_exact(2);
    for pair in &mut pairs {
        sum = sum.wrapping_add(u16::from_be_bytes([pair[0], pair[1]]));
    }
    if let [last] = pairs.remainder() {
        sum ^= *last as u16;
    }
    sum
}

/// 单个数据包（解析后不可变）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: u8,
    payload: Bytes,
}

impl Packet {
    /// 创建数据包，负载超过 [`MAX_PAYLOAD_LEN`] 时返回错误
    pub fn new(id: u8, payload: impl Into<Bytes>) -> Result<Self, ProtocolError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Self { id, payload })
    }

    /// 调用方已保证负载长度合法
    pub(crate) fn from_parts(id: u8, payload: Bytes) -> Self {
        debug_assert!(payload.len() <= MAX_PAYLOAD_LEN);
        Self { id, payload }
    }

    /// 创建无负载数据包
    pub fn empty(id: u8) -> Self {
        Self {
            id,
            payload: Bytes::new(),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 负载读取游标
    pub fn reader(&self) -> PayloadReader<'_> {
        PayloadReader::new(&self.payload)
    }

    /// 编码后的帧长度
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + 1 + self.payload.len() + CHECKSUM_LEN
    }

    /// 编码为完整帧
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// 追加编码到已有缓冲区（批量发送时复用同一块内存）
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let start = buf.len();
        let length_field = (1 + self.payload.len() + CHECKSUM_LEN) as u16;
        buf.reserve(self.encoded_len());
        buf.put_u8(SYNC_BYTE_1);
        buf.put_u8(SYNC_BYTE_2);
        buf.put_u16_le(length_field);
        buf.put_u8(self.id);
        buf.put_slice(&self.payload);
        let sum = checksum(&buf[start..]);
        buf.put_u16_le(sum);
    }
}

/// 负载读取游标
///
/// 所有读取都做边界检查，越界返回 [`ProtocolError::Truncated`] 而不是 panic。
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let end = self.offset + N;
        let slice = self.data.get(self.offset..end).ok_or(ProtocolError::Truncated {
            offset: self.offset,
            needed: end.saturating_sub(self.data.len()),
        })?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.offset = end;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    pub fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.take::<4>().map(i32::from_le_bytes)
    }

    /// 读取 NUL 结尾字符串（无 NUL 时读到负载末尾），非 UTF-8 字节做有损替换
    pub fn read_str(&mut self) -> String {
        let rest = &self.data[self.offset..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        let text = String::from_utf8_lossy(&rest[..end]).into_owned();
        self.offset += (end + 1).min(rest.len());
        text
    }
}
