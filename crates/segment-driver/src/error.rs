//! 驱动层错误类型定义

use segment_protocol::PacketError;
use segment_protocol::tmc9660::Status;
use segment_serial::SerialError;
use thiserror::Error;

/// 电机驱动器传输错误
///
/// 只影响出错的电机实例，不影响其他实例。
#[derive(Error, Debug)]
pub enum TransportError {
    /// 截止时间内未收满 8 字节应答
    #[error("Reply timeout: received {received} of 8 bytes")]
    Timeout { received: usize },

    /// 应答 CRC8 校验失败
    #[error("Reply CRC8 mismatch: computed 0x{expected:02X}, trailer 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    /// 设备返回非 OK 状态，应答数据仍然有效
    #[error("Device returned status {status} (value 0x{value:08X})")]
    DeviceStatus { status: Status, value: u32 },

    /// CONFIG 偏移越界或未按 4 字节对齐
    #[error("Invalid CONFIG offset {offset}: must be < 64 and 4-byte aligned")]
    Alignment { offset: u8 },

    /// 芯片类型不匹配
    #[error("Unexpected chip type 0x{actual:08X} (expected 0x{expected:08X})")]
    DeviceMismatch { expected: u32, actual: u32 },

    #[error("Transport not initialized")]
    NotInitialized,

    #[error("Serial error: {0}")]
    Serial(SerialError),
}

impl From<SerialError> for TransportError {
    fn from(err: SerialError) -> Self {
        match err {
            SerialError::Timeout { received, .. } => TransportError::Timeout { received },
            other => TransportError::Serial(other),
        }
    }
}

impl TransportError {
    /// `DeviceStatus` 时返回应答数据
    pub fn reply_value(&self) -> Option<u32> {
        match self {
            TransportError::DeviceStatus { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    /// 配置文件解析或校验失败
    #[error("Config error: {0}")]
    Config(String),

    /// 姿态传感器读取失败
    #[error("Sensor error: {0}")]
    Sensor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for DriverError {
    fn from(err: toml::de::Error) -> Self {
        DriverError::Config(err.to_string())
    }
}
