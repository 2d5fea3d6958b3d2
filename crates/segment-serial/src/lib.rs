//! # Segment Serial Channel Layer
//!
//! 点对点串口链路抽象。每个电机驱动器对应一条独立链路，
//! 上层按“发送请求 → 在截止时间内读满固定长度应答”的方式使用。
//!
//! ## 后端
//!
//! - `uart`（默认）：基于 `serialport` 的真实串口
//! - `mock`：脚本化应答，用于测试

use std::time::Duration;
use thiserror::Error;

#[cfg(feature = "uart")]
pub mod uart;

#[cfg(feature = "uart")]
pub use uart::UartChannel;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockChannel;

/// 串口链路统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    /// 截止时间内未收满
    #[error("Read timeout: received {received} of {expected} bytes")]
    Timeout { received: usize, expected: usize },
    #[error("Channel not open")]
    NotOpen,
    #[error("Device Error: {0}")]
    Device(String),
}

impl From<String> for SerialError {
    fn from(message: String) -> Self {
        SerialError::Device(message)
    }
}

/// 点对点字节链路
pub trait SerialChannel: Send {
    /// 打开底层设备；已打开时为空操作
    fn open(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        true
    }

    /// 发送全部字节
    fn send(&mut self, data: &[u8]) -> Result<(), SerialError>;

    /// 在 `timeout` 内读满 `buf`
    ///
    /// 超时返回 `SerialError::Timeout`，其中 `received` 为已读取的字节数。
    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), SerialError>;

    /// 丢弃输入缓冲区中的残留字节
    fn clear_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }

    /// 链路描述（用于日志）
    fn describe(&self) -> String {
        String::from("serial")
    }
}

impl<T: SerialChannel + ?Sized> SerialChannel for Box<T> {
    fn open(&mut self) -> Result<(), SerialError> {
        (**self).open()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn send(&mut self, data: &[u8]) -> Result<(), SerialError> {
        (**self).send(data)
    }

    fn receive_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), SerialError> {
        (**self).receive_exact(buf, timeout)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        (**self).clear_input()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
