//! 内置数据包处理器
//!
//! - 状态包（0x32 / 0x33）：独占认领，解码后写入 [`RobotState`]
//! - 固件调试消息：记录日志并计数
//! - 安全系统状态（214）：解码后保存
//! - 安全警告（217）：记录日志并计数，不截断分发

use crate::error::DriverError;
use crate::handlers::{HandlerOutcome, HandlerRegistry, PacketClass};
use crate::state::RobotState;
use arbiter_protocol::{
    ID_SAFETY_STATE, ID_STATUS_MOVING, ID_STATUS_STOPPED, Packet, SafetyState, StatusPacket,
};
use tracing::{info, warn};

/// 状态包处理器
pub fn handle_status(packet: &Packet, state: &mut RobotState) -> HandlerOutcome {
    match StatusPacket::try_from(packet) {
        Ok(status) => {
            state.apply_status(&status);
            HandlerOutcome::Consumed
        },
        Err(e) => {
            warn!("Dropping malformed status packet {:#04x}: {}", packet.id(), e);
            HandlerOutcome::Consumed
        },
    }
}

/// 固件调试消息处理器
pub fn handle_debug_message(packet: &Packet, state: &mut RobotState) -> HandlerOutcome {
    let message = packet.reader().read_str();
    info!("Firmware debug: {}", message);
    state.debug_messages += 1;
    state.last_debug_message = Some(message);
    HandlerOutcome::Consumed
}

/// 安全系统状态处理器
pub fn handle_safety_state(packet: &Packet, state: &mut RobotState) -> HandlerOutcome {
    match SafetyState::try_from(packet) {
        Ok(safety) => {
            if safety.system.blocks_motion() || safety.estop.blocks_motion() {
                warn!("Safety system reports failure: {:?}", safety);
            }
            state.safety = Some(safety);
        },
        Err(e) => warn!("Dropping malformed safety state packet: {}", e),
    }
    HandlerOutcome::Consumed
}

/// 安全警告处理器，不截断分发
pub fn handle_safety_warning(packet: &Packet, state: &mut RobotState) -> HandlerOutcome {
    state.safety_warnings += 1;
    warn!(
        "Safety warning received ({} bytes payload, {} total)",
        packet.payload().len(),
        state.safety_warnings
    );
    HandlerOutcome::PassThrough
}

/// 安装全部内置处理器
pub fn install_default_handlers(registry: &mut HandlerRegistry) -> Result<(), DriverError> {
    registry.claim(ID_STATUS_STOPPED, handle_status)?;
    registry.claim(ID_STATUS_MOVING, handle_status)?;
    registry.add(PacketClass::Debug, handle_debug_message);
    registry.add(PacketClass::Id(ID_SAFETY_STATE), handle_safety_state);
    registry.add(PacketClass::Warning, handle_safety_warning);
    Ok(())
}
