//! 状态包解析
//!
//! 控制器周期性回传标准状态包（ID 0x32 / 0x33），
//! 另有按需请求的安全系统状态包（ID 214）。

use crate::ProtocolError;
use crate::ids::*;
use crate::packet::Packet;
use bytes::{BufMut, BytesMut};

/// 状态包负载长度
pub const STATUS_PAYLOAD_LEN: usize = 22;

/// 状态标志位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusFlags(pub u16);

impl StatusFlags {
    pub const MOTORS_ENABLED: u16 = 1 << 0;
    pub const ESTOP_PRESSED: u16 = 1 << 5;
    pub const LEFT_STALL: u16 = 1 << 8;
    pub const RIGHT_STALL: u16 = 1 << 9;

    pub fn motors_enabled(self) -> bool {
        self.0 & Self::MOTORS_ENABLED != 0
    }

    pub fn estop_pressed(self) -> bool {
        self.0 & Self::ESTOP_PRESSED != 0
    }

    pub fn left_stalled(self) -> bool {
        self.0 & Self::LEFT_STALL != 0
    }

    pub fn right_stalled(self) -> bool {
        self.0 & Self::RIGHT_STALL != 0
    }
}

/// 标准状态包
///
/// 负载布局（小端）：
///
/// | 偏移 | 类型 | 字段 |
/// |------|------|------|
/// | 0    | i32  | x (mm) |
/// | 4    | i32  | y (mm) |
/// | 8    | i16  | 航向 (0.1 deg) |
/// | 10   | i16  | 平移速度 (mm/s) |
/// | 12   | i16  | 旋转速度 (0.1 deg/s) |
/// | 14   | i16  | 横向速度 (mm/s) |
/// | 16   | u16  | 电池电压 (0.1 V) |
/// | 18   | u16  | 状态标志 |
/// | 20   | u16  | 故障标志 |
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusPacket {
    pub moving: bool,
    pub x_mm: f64,
    pub y_mm: f64,
    pub heading_deg: f64,
    pub vel: f64,
    pub rot_vel: f64,
    pub lat_vel: f64,
    pub battery_voltage: f64,
    pub flags: StatusFlags,
    pub fault_flags: u16,
}

impl TryFrom<&Packet> for StatusPacket {
    type Error = ProtocolError;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        if !is_status_id(packet.id()) {
            return Err(ProtocolError::UnexpectedId(packet.id()));
        }

        let mut r = packet.reader();
        Ok(Self {
            moving: packet.id() == ID_STATUS_MOVING,
            x_mm: r.read_i32()? as f64,
            y_mm: r.read_i32()? as f64,
            heading_deg: r.read_i16()? as f64 / 10.0,
            vel: r.read_i16()? as f64,
            rot_vel: r.read_i16()? as f64 / 10.0,
            lat_vel: r.read_i16()? as f64,
            battery_voltage: r.read_u16()? as f64 / 10.0,
            flags: StatusFlags(r.read_u16()?),
            fault_flags: r.read_u16()?,
        })
    }
}

impl StatusPacket {
    /// 编码为状态包（模拟器 / 测试使用）
    pub fn encode(&self) -> Packet {
        let mut buf = BytesMut::with_capacity(STATUS_PAYLOAD_LEN);
        buf.put_i32_le(self.x_mm.round() as i32);
        buf.put_i32_le(self.y_mm.round() as i32);
        buf.put_i16_le((self.heading_deg * 10.0).round() as i16);
        buf.put_i16_le(self.vel.round() as i16);
        buf.put_i16_le((self.rot_vel * 10.0).round() as i16);
        buf.put_i16_le(self.lat_vel.round() as i16);
        buf.put_u16_le((self.battery_voltage * 10.0).round() as u16);
        buf.put_u16_le(self.flags.0);
        buf.put_u16_le(self.fault_flags);

        let id = if self.moving {
            ID_STATUS_MOVING
        } else {
            ID_STATUS_STOPPED
        };
        Packet::from_parts(id, buf.freeze())
    }
}

impl Default for StatusPacket {
    fn default() -> Self {
        Self {
            moving: false,
            x_mm: 0.0,
            y_mm: 0.0,
            heading_deg: 0.0,
            vel: 0.0,
            rot_vel: 0.0,
            lat_vel: 0.0,
            battery_voltage: 0.0,
            flags: StatusFlags::default(),
            fault_flags: 0,
        }
    }
}

/// 安全子系统状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SafetyLevel {
    Unknown,
    Failure,
    Warning,
    Commissioned,
    Decommissioned,
    Invalid(u8),
}

impl From<u8> for SafetyLevel {
    fn from(value: u8) -> Self {
        match value {
            0x00 => SafetyLevel::Unknown,
            0x10 => SafetyLevel::Failure,
            0x20 => SafetyLevel::Warning,
            0x40 => SafetyLevel::Commissioned,
            0x50 => SafetyLevel::Decommissioned,
            other => SafetyLevel::Invalid(other),
        }
    }
}

impl SafetyLevel {
    /// 控制器拒绝运动
    pub fn blocks_motion(self) -> bool {
        self == SafetyLevel::Failure
    }

    /// 控制器限制运动速度
    pub fn limits_motion(self) -> bool {
        self == SafetyLevel::Warning
    }
}

/// 安全系统状态包（ID 214）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SafetyState {
    pub system: SafetyLevel,
    pub estop: SafetyLevel,
    pub laser: SafetyLevel,
}

impl TryFrom<&Packet> for SafetyState {
    type Error = ProtocolError;

    fn try_from(packet: &Packet) -> Result<Self, Self::Error> {
        if packet.id() != ID_SAFETY_STATE {
            return Err(ProtocolError::UnexpectedId(packet.id()));
        }
        let mut r = packet.reader();
        Ok(Self {
            system: r.read_u8()?.into(),
            estop: r.read_u8()?.into(),
            laser: r.read_u8()?.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> StatusPacket {
        StatusPacket {
            moving: true,
            x_mm: 1200.0,
            y_mm: -340.0,
            heading_deg: -45.5,
            vel: 250.0,
            rot_vel: 12.5,
            lat_vel: 0.0,
            battery_voltage: 12.8,
            flags: StatusFlags(StatusFlags::MOTORS_ENABLED | StatusFlags::LEFT_STALL),
            fault_flags: 0x0004,
        }
    }

    #[test]
    fn test_status_decode_fields() {
        let packet = sample().encode();
        assert_eq!(packet.id(), ID_STATUS_MOVING);
        assert_eq!(packet.payload().len(), STATUS_PAYLOAD_LEN);

        let status = StatusPacket::try_from(&packet).unwrap();
        assert_eq!(status, sample());
        assert!(status.flags.motors_enabled());
        assert!(status.flags.left_stalled());
        assert!(!status.flags.right_stalled());
        assert!(!status.flags.estop_pressed());
    }

    #[test]
    fn test_status_wrong_id() {
        let packet = Packet::new(0x40, vec![0u8; STATUS_PAYLOAD_LEN]).unwrap();
        assert_eq!(
            StatusPacket::try_from(&packet).unwrap_err(),
            ProtocolError::UnexpectedId(0x40)
        );
    }

    #[test]
    fn test_status_truncated() {
        let packet = Packet::new(ID_STATUS_STOPPED, vec![0u8; 10]).unwrap();
        assert!(matches!(
            StatusPacket::try_from(&packet),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_safety_state_decode() {
        let packet = Packet::new(ID_SAFETY_STATE, vec![0x40, 0x10, 0x33]).unwrap();
        let state = SafetyState::try_from(&packet).unwrap();
        assert_eq!(state.system, SafetyLevel::Commissioned);
        assert!(state.estop.blocks_motion());
        assert_eq!(state.laser, SafetyLevel::Invalid(0x33));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_status_serde_json() {
        let json = serde_json::to_string(&sample()).unwrap();
        let back: StatusPacket = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
