//! # Arbiter Protocol
//!
//! 底盘控制器串行协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 命令 ID / 数据包 ID 常量
//! - `packet`: 数据包模型、帧编码与校验和
//! - `deframer`: 字节流拆帧（坏帧丢弃 + 重新同步）
//! - `command`: 原始命令构建（`com` / `com_int` / `com_2bytes`）
//! - `status`: 状态包（SIP）解析
//!
//! ## 帧格式
//!
//! ```text
//! [0xFA 0xFB][len: u16 LE][id: u8][payload ...][checksum: u16 LE]
//! len = 1 + payload.len() + 2
//! ```
//!
//! 多字节字段统一使用小端字节序；校验和按大端字对累加（与控制器固件一致）。

pub mod command;
pub mod deframer;
pub mod ids;
pub mod packet;
pub mod status;

pub use command::*;
pub use deframer::{Deframer, DeframerStats};
pub use ids::*;
pub use packet::{Packet, PayloadReader, checksum};
pub use status::{SafetyLevel, SafetyState, StatusFlags, StatusPacket};

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong { len: usize, max: usize },

    #[error("Invalid frame length field: {0}")]
    InvalidLength(u16),

    #[error("Checksum mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Unexpected packet id 0x{0:02X}")]
    UnexpectedId(u8),

    #[error("Truncated payload: need {needed} more bytes at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 i32
pub fn bytes_to_i32_le(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}
