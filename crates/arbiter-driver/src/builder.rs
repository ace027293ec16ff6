//! Builder 模式实现
//!
//! 提供链式构造 `Robot` 实例的便捷方式。

use crate::config::RobotConfig;
use crate::cycle::CycleConfig;
use crate::error::DriverError;
use crate::pipeline::ReaderConfig;
use crate::robot::Robot;
use arbiter_action::{KinematicLimits, ResolveMode};
#[cfg(feature = "serial")]
use arbiter_link::SerialLink;
use arbiter_link::{SplittableLink, TcpLink};
use std::net::ToSocketAddrs;
use std::time::Duration;
use tracing::info;

/// Robot Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use arbiter_driver::RobotBuilder;
/// use std::time::Duration;
///
/// let robot = RobotBuilder::new()
///     .period_ms(50)
///     .stop_on_disconnect(true)
///     .connect_tcp("127.0.0.1:8101", Duration::from_secs(2))
///     .unwrap();
/// robot.run_async().unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct RobotBuilder {
    config: RobotConfig,
}

impl RobotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从完整配置开始
    pub fn with_config(config: RobotConfig) -> Self {
        Self { config }
    }

    /// 控制周期（毫秒）
    pub fn period_ms(mut self, period_ms: u64) -> Self {
        self.config.cycle.period_ms = period_ms;
        self
    }

    /// 执行指定周期数后自动停止
    pub fn max_cycles(mut self, max_cycles: u64) -> Self {
        self.config.cycle.max_cycles = Some(max_cycles);
        self
    }

    pub fn cycle_config(mut self, config: CycleConfig) -> Self {
        self.config.cycle = config;
        self
    }

    pub fn reader_config(mut self, config: ReaderConfig) -> Self {
        self.config.reader = config;
        self
    }

    /// 连接断开时停止控制周期
    pub fn stop_on_disconnect(mut self, enabled: bool) -> Self {
        self.config.reader.stop_on_disconnect = enabled;
        self
    }

    pub fn limits(mut self, limits: KinematicLimits) -> Self {
        self.config.limits = limits;
        self
    }

    pub fn resolve_mode(mut self, mode: ResolveMode) -> Self {
        self.config.resolve_mode = mode;
        self
    }

    pub fn connection_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.connection_timeout_ms = timeout_ms;
        self
    }

    /// 不安装内置数据包处理器
    pub fn without_default_handlers(mut self) -> Self {
        self.config.install_default_handlers = false;
        self
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// 在任意链路上构建
    pub fn build<L: SplittableLink>(self, link: L) -> Result<Robot, DriverError> {
        Robot::new(link, self.config)
    }

    /// 连接 TCP 控制器（或仿真器）
    ///
    /// 写超时取控制周期，控制器停止读取时周期不会卡在发送上。
    pub fn connect_tcp(
        self,
        addr: impl ToSocketAddrs,
        timeout: Duration,
    ) -> Result<Robot, DriverError> {
        let link = TcpLink::connect(addr, timeout)?;
        link.set_write_timeout(self.config.cycle.period())?;
        info!("Connected to robot over TCP");
        self.build(link)
    }

    /// 打开串口
    #[cfg(feature = "serial")]
    pub fn open_serial(self, path: &str, baud_rate: u32) -> Result<Robot, DriverError> {
        let link = SerialLink::open(path, baud_rate)?;
        info!("Opened serial port {} at {} baud", path, baud_rate);
        self.build(link)
    }
}
