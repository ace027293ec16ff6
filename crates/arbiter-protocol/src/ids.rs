//! 命令 ID / 数据包 ID 常量定义
//!
//! 发往控制器的命令 ID 与控制器回传的数据包 ID 共用同一个 8 位空间，
//! 并提供入站数据包的分类功能。

// ============================================================================
// 命令 ID 常量（客户端 → 控制器）
// ============================================================================

/// 心跳
pub const CMD_PULSE: u8 = 0;
/// 打开控制器会话
pub const CMD_OPEN: u8 = 1;
/// 关闭控制器会话
pub const CMD_CLOSE: u8 = 2;
/// 电机使能（参数 1 = 使能，0 = 失能）
pub const CMD_ENABLE: u8 = 4;
/// 平移加/减速度（正值 = 加速度，负值 = 减速度，mm/s²）
pub const CMD_SET_TRANS_ACCEL: u8 = 5;
/// 最大平移速度（mm/s）
pub const CMD_SET_MAX_VEL: u8 = 6;
/// 最大旋转速度（deg/s）
pub const CMD_SET_MAX_ROT_VEL: u8 = 10;
/// 平移速度（mm/s）
pub const CMD_VEL: u8 = 11;
/// 绝对航向（deg）
pub const CMD_HEAD: u8 = 12;
/// 相对航向（deg）
pub const CMD_DELTA_HEADING: u8 = 13;
/// 旋转速度（deg/s）
pub const CMD_ROT_VEL: u8 = 21;
/// 旋转加/减速度（正值 = 加速度，负值 = 减速度，deg/s²）
pub const CMD_SET_ROT_ACCEL: u8 = 23;
/// 停止（保持使能）
pub const CMD_STOP: u8 = 29;
/// 最大倒车速度（mm/s，参数为正值）
pub const CMD_SET_MAX_NEG_VEL: u8 = 31;
/// 急停
pub const CMD_ESTOP: u8 = 55;
/// 横向速度（mm/s，正值 = 向左）
pub const CMD_LAT_VEL: u8 = 110;
/// 最大横向速度（mm/s）
pub const CMD_SET_MAX_LAT_VEL: u8 = 111;
/// 横向加/减速度（正值 = 加速度，负值 = 减速度）
pub const CMD_SET_LAT_ACCEL: u8 = 113;
/// 请求安全系统状态
pub const CMD_SAFETY_STATE_INFO: u8 = 214;

// ============================================================================
// 入站数据包 ID 常量（控制器 → 客户端）
// ============================================================================

/// 标准状态包（电机停止）
pub const ID_STATUS_STOPPED: u8 = 0x32;
/// 标准状态包（电机运动）
pub const ID_STATUS_MOVING: u8 = 0x33;
/// 固件调试消息（NUL 结尾字符串）
pub const ID_DEBUG_MESSAGE: u8 = 211;
/// 安全系统状态
pub const ID_SAFETY_STATE: u8 = 214;
/// 安全系统警告
pub const ID_SAFETY_WARNING: u8 = 217;

/// 是否为标准状态包
pub fn is_status_id(id: u8) -> bool {
    matches!(id, ID_STATUS_STOPPED | ID_STATUS_MOVING)
}

/// 入站数据包分类
///
/// 调试 / 警告类数据包是非独占的：所有匹配的处理器都会收到。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// 标准状态包
    Status,
    /// 固件调试消息
    Debug,
    /// 安全系统警告
    Warning,
    /// 其他数据包（按 ID 独占分发）
    Other,
}

impl PacketKind {
    /// 根据数据包 ID 判断分类
    pub fn from_id(id: u8) -> Self {
        match id {
            ID_STATUS_STOPPED | ID_STATUS_MOVING => PacketKind::Status,
            ID_DEBUG_MESSAGE => PacketKind::Debug,
            ID_SAFETY_WARNING => PacketKind::Warning,
            _ => PacketKind::Other,
        }
    }

    /// 非独占分类：分发时不会被第一个处理器截断
    pub fn is_non_exclusive(self) -> bool {
        matches!(self, PacketKind::Debug | PacketKind::Warning)
    }
}
