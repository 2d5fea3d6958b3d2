//! # Segment Protocol
//!
//! 段控制器的线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 魔数、包类型码、模式、错误码
//! - `crc`: CRC16-CCITT（网络包）与 CRC8（TMC9660 UART 帧）
//! - `command`: 命令包解析与编码（上位机 → 段控制器）
//! - `telemetry`: 遥测包构建与解码（段控制器 → 上位机）
//! - `tmc9660`: 电机驱动芯片 UART 请求/应答帧
//!
//! ## 字节序
//!
//! 网络包（命令/遥测）使用小端字节序；TMC9660 帧的 32 位数据字段使用大端（MSB 在前）。
//! 所有编码都是显式的逐字节读写，与编译器的结构体布局无关。

mod codec;
pub mod command;
pub mod constants;
pub mod crc;
pub mod telemetry;
pub mod tmc9660;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use crc::*;
pub use telemetry::*;

use thiserror::Error;

/// 命令包解析错误类型
///
/// 所有变体都是局部错误：调度器记录后继续处理后续包，从不终止。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// 缓冲区短于最小帧长（6 字节）
    #[error("Packet too short: {len} bytes (minimum 6)")]
    TooShort { len: usize },

    /// 方向魔数不匹配
    #[error("Invalid magic header: expected 0x{expected:04X}, got 0x{actual:04X}")]
    MagicMismatch { expected: u16, actual: u16 },

    /// CRC16 校验失败
    #[error("CRC16 mismatch: computed 0x{expected:04X}, trailer 0x{actual:04X}")]
    ChecksumError { expected: u16, actual: u16 },

    /// 包长度与该类型的固定长度不一致
    #[error("Size mismatch for packet type 0x{packet_type:02X}: expected {expected}, got {actual}")]
    SizeMismatch {
        packet_type: u8,
        expected: usize,
        actual: usize,
    },

    /// 未知包类型
    #[error("Unknown packet type 0x{packet_type:02X}")]
    UnknownType { packet_type: u8 },

    /// 枚举字段取值超出定义范围
    #[error("Invalid value for field {field}: 0x{value:02X}")]
    InvalidField { field: &'static str, value: u8 },
}

impl PacketError {
    /// 该错误记录到 `SystemState` 中的线上错误码
    ///
    /// 所有帧级错误统一记为 `CrcError`。
    pub fn error_code(&self) -> ErrorCode {
        match self {
            PacketError::TooShort { .. }
            | PacketError::MagicMismatch { .. }
            | PacketError::ChecksumError { .. }
            | PacketError::SizeMismatch { .. }
            | PacketError::UnknownType { .. }
            | PacketError::InvalidField { .. } => ErrorCode::CrcError,
        }
    }
}
