//! 驱动配置

use crate::cycle::CycleConfig;
use crate::pipeline::ReaderConfig;
use arbiter_action::{KinematicLimits, ResolveMode};

/// 机器人驱动配置
///
/// # Example
///
/// ```
/// use arbiter_driver::{CycleConfig, RobotConfig};
///
/// let config = RobotConfig {
///     cycle: CycleConfig {
///         period_ms: 50,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.reader.stop_on_disconnect);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RobotConfig {
    /// 控制周期配置
    pub cycle: CycleConfig,
    /// 读线程配置
    pub reader: ReaderConfig,
    /// 运动学上限
    pub limits: KinematicLimits,
    /// 仲裁模式
    pub resolve_mode: ResolveMode,
    /// 超过该时长未收到有效数据包视为连接超时（毫秒）
    pub connection_timeout_ms: u64,
    /// 是否安装内置数据包处理器（状态包、调试消息、安全系统）
    pub install_default_handlers: bool,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            cycle: CycleConfig::default(),
            reader: ReaderConfig::default(),
            limits: KinematicLimits::default(),
            resolve_mode: ResolveMode::default(),
            connection_timeout_ms: 1000,
            install_default_handlers: true,
        }
    }
}
