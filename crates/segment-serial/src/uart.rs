//! 基于 `serialport` 的 UART 后端

use crate::{SerialChannel, SerialError};
use serialport::{ClearBuffer, SerialPort};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// 单次阻塞读的最长等待，实际等待受截止时间约束
const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// 一个串口设备
///
/// 创建时不打开设备，`open()` 时才真正打开，便于在初始化阶段统一报告失败。
pub struct UartChannel {
    path: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
}

impl UartChannel {
    pub fn new(path: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, SerialError> {
        self.port.as_mut().ok_or(SerialError::NotOpen)
    }
}

impl SerialChannel for UartChannel {
    fn open(&mut self) -> Result<(), SerialError> {
        if self.port.is_some() {
            return Ok(());
        }
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(POLL_TIMEOUT)
            .open()
            .map_err(|e| SerialError::Device(format!("Failed to open port {}: {}", self.path, e)))?;
        debug!("Opened {} at {} baud", self.path, self.baud_rate);
        self.port = Some(port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SerialError> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        trace!("TX {:02X?}", data);
        Ok(())
    }

    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), SerialError> {
        let expected = buf.len();
        let deadline = Instant::now() + timeout;
        let port = self.port_mut()?;
        let mut received = 0;

        while received < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SerialError::Timeout { received, expected });
            }
            port.set_timeout(remaining.min(POLL_TIMEOUT))
                .map_err(|e| SerialError::Device(e.to_string()))?;

            match port.read(&mut buf[received..]) {
                Ok(0) => {},
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {},
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(SerialError::Io(e)),
            }
        }

        trace!("RX {:02X?}", buf);
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        let port = self.port_mut()?;
        port.clear(ClearBuffer::Input)
            .map_err(|e| SerialError::Device(e.to_string()))
    }

    fn describe(&self) -> String {
        format!("{}@{}", self.path, self.baud_rate)
    }
}
