//! 串口链路
//!
//! 8N1、无流控。拆分时通过 `try_clone` 得到独立的读写句柄。

use crate::{LinkError, RxLink, SplittableLink, TxLink, map_read_error};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::info;

/// 控制器默认波特率
pub const DEFAULT_BAUD_RATE: u32 = 9600;

impl From<serialport::Error> for LinkError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::Io(kind) => LinkError::Io(std::io::Error::new(kind, e.description)),
            serialport::ErrorKind::NoDevice => LinkError::Disconnected,
            _ => LinkError::Device(e.description),
        }
    }
}

pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// 打开串口
    ///
    /// # 参数
    /// - `path`: 设备路径（如 `/dev/ttyUSB0`）
    /// - `baud_rate`: 波特率
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(20))
            .open()?;
        info!("Opened serial port: {} at {} baud", path, baud_rate);
        Ok(Self { port })
    }
}

impl SplittableLink for SerialLink {
    type Rx = SerialRx;
    type Tx = SerialTx;

    fn split(self) -> Result<(SerialRx, SerialTx), LinkError> {
        let rx = self.port.try_clone()?;
        Ok((
            SerialRx {
                port: rx,
                current_timeout: None,
            },
            SerialTx {
                port: Some(self.port),
            },
        ))
    }
}

pub struct SerialRx {
    port: Box<dyn SerialPort>,
    current_timeout: Option<Duration>,
}

impl RxLink for SerialRx {
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkError> {
        if self.current_timeout != Some(timeout) {
            self.port.set_timeout(timeout)?;
            self.current_timeout = Some(timeout);
        }
        match self.port.read(buf) {
            Ok(0) => Err(LinkError::Timeout),
            Ok(n) => Ok(n),
            Err(e) => Err(map_read_error(e)),
        }
    }
}

pub struct SerialTx {
    port: Option<Box<dyn SerialPort>>,
}

impl TxLink for SerialTx {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::Disconnected)?;
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    /// 串口无法从写端唤醒读端，读端依赖自身的读超时退出
    fn close(&mut self) {
        self.port = None;
    }
}
