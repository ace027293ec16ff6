//! 原始命令构建
//!
//! 三种命令形态：无参数、一个 16 位有符号整数参数、两个字节参数。
//! 整数参数前带一个类型字节，控制器据此判断符号，后跟绝对值（u16 LE）。

use crate::ids::*;
use crate::packet::Packet;
use bytes::{BufMut, BytesMut};

/// 非负整数参数类型字节
pub const ARG_INT: u8 = 0x3B;
/// 负整数参数类型字节
pub const ARG_NINT: u8 = 0x1B;
/// 字符串参数类型字节
pub const ARG_STR: u8 = 0x2B;

/// 无参数命令
pub fn com(id: u8) -> Packet {
    Packet::empty(id)
}

/// 带一个 16 位有符号整数参数的命令
pub fn com_int(id: u8, value: i16) -> Packet {
    let mut payload = BytesMut::with_capacity(3);
    payload.put_u8(if value >= 0 { ARG_INT } else { ARG_NINT });
    payload.put_u16_le(value.unsigned_abs());
    Packet::from_parts(id, payload.freeze())
}

/// 带两个字节参数的命令（高字节在前组成一个整数）
pub fn com_2bytes(id: u8, high: u8, low: u8) -> Packet {
    com_int(id, i16::from_be_bytes([high, low]))
}

/// 带字符串参数的命令（长度前缀，超长截断）
pub fn com_str(id: u8, text: &str) -> Packet {
    let bytes = text.as_bytes();
    let len = bytes.len().min(crate::packet::MAX_PAYLOAD_LEN - 2);
    let mut payload = BytesMut::with_capacity(len + 2);
    payload.put_u8(ARG_STR);
    payload.put_u8(len as u8);
    payload.put_slice(&bytes[..len]);
    Packet::from_parts(id, payload.freeze())
}

/// 把数值命令参数饱和到 i16 范围并取整
pub fn saturate_i16(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// 解析整数参数负载（`com_int` 的逆过程）
pub fn decode_int_arg(packet: &Packet) -> Option<i16> {
    let mut reader = packet.reader();
    let kind = reader.read_u8().ok()?;
    let magnitude = reader.read_u16().ok()?;
    match kind {
        ARG_INT => i16::try_from(magnitude).ok(),
        ARG_NINT => 0i32
            .checked_sub(magnitude as i32)
            .and_then(|v| i16::try_from(v).ok()),
        _ => None,
    }
}

/// 电机使能 / 失能
pub fn enable_motors(enable: bool) -> Packet {
    com_int(CMD_ENABLE, i16::from(enable))
}

/// 停止
pub fn stop() -> Packet {
    com(CMD_STOP)
}

/// 急停
pub fn estop() -> Packet {
    com(CMD_ESTOP)
}
