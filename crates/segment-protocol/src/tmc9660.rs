//! TMC9660 UART 引导加载器协议帧
//!
//! 固定 8 字节帧，每个请求恰好对应一个应答：
//!
//! ```text
//! 请求: sync(0x55) | device_addr | command | data[4] (MSB first) | crc8
//! 应答: host_addr  | device_addr | status  | data[4] (MSB first) | crc8
//! ```
//!
//! CRC8 覆盖前 7 字节。

use crate::crc::crc8;
use thiserror::Error;

/// 帧长度
pub const FRAME_SIZE: usize = 8;

/// 请求帧同步字节
pub const SYNC_BYTE: u8 = 0x55;

pub const DEFAULT_DEVICE_ADDR: u8 = 0x01;
pub const DEFAULT_HOST_ADDR: u8 = 0xFF;

/// CONFIG 存储区基地址
pub const CONFIG_BASE_ADDR: u32 = 0x0002_0000;

/// CONFIG 存储区大小（字节）
pub const CONFIG_SIZE: u8 = 64;

/// 期望的芯片类型 ID
pub const CHIP_TYPE_EXPECTED: u32 = 0x544D_0001;

/// 期望的芯片变体
pub const CHIP_VARIANT_EXPECTED: u32 = 2;

/// 未选择任何存储区时缓存的 bank 值
pub const BANK_UNSELECTED: u8 = 0xFF;

// ============================================================================
// 命令 / 状态 / 存储区 / 信息选择器
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    GetInfo = 0x00,
    GetBank = 0x08,
    SetBank = 0x09,
    GetAddress = 0x0A,
    SetAddress = 0x0B,
    Read32 = 0x0C,
    Read32Inc = 0x0D,
    Write32 = 0x12,
    Write32Inc = 0x13,
    NoOp = 0x1D,
}

/// 应答状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum Status {
    Ok = 0x00,
    CommandNotFound = 0x01,
    InvalidAddress = 0x03,
    InvalidValue = 0x04,
    InvalidBank = 0x0E,
    Busy = 0x0F,
    MemoryUnconfigured = 0x11,
    OtpError = 0x12,
    #[num_enum(catch_all)]
    Unknown(u8),
}

impl Status {
    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Unknown(code) => write!(f, "UNKNOWN(0x{:02X})", code),
            other => write!(f, "{:?}(0x{:02X})", other, u8::from(*other)),
        }
    }
}

/// 存储区
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bank {
    Reserved = 0,
    Spi = 1,
    I2c = 2,
    Otp = 3,
    Config = 5,
}

/// GET_INFO 信息选择器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InfoSelector {
    ChipType = 0,
    BootloaderVersion = 1,
    Features = 2,
    ChipVersion = 13,
    ChipFrequency = 14,
    ConfigMemStart = 17,
    ConfigMemSize = 18,
    ChipVariant = 28,
}

// ============================================================================
// 帧
// ============================================================================

/// 应答帧 CRC8 校验失败
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("CRC8 mismatch: computed 0x{expected:02X}, trailer 0x{actual:02X}")]
pub struct FrameChecksumError {
    pub expected: u8,
    pub actual: u8,
}

/// 请求帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub device_addr: u8,
    pub command: Command,
    pub data: u32,
}

impl Request {
    pub fn new(device_addr: u8, command: Command, data: u32) -> Self {
        Self {
            device_addr,
            command,
            data,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = SYNC_BYTE;
        frame[1] = self.device_addr;
        frame[2] = self.command as u8;
        frame[3..7].copy_from_slice(&self.data.to_be_bytes());
        frame[7] = crc8(&frame[..7]);
        frame
    }
}

/// 应答帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reply {
    pub host_addr: u8,
    pub device_addr: u8,
    pub status: Status,
    pub data: u32,
}

impl Reply {
    /// 校验 CRC8 并解码
    pub fn decode(frame: &[u8; FRAME_SIZE]) -> Result<Self, FrameChecksumError> {
        let expected = crc8(&frame[..7]);
        if frame[7] != expected {
            return Err(FrameChecksumError {
                expected,
                actual: frame[7],
            });
        }
        Ok(Self {
            host_addr: frame[0],
            device_addr: frame[1],
            status: Status::from(frame[2]),
            data: u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]),
        })
    }

    /// 编码应答帧（模拟器与测试使用）
    pub fn encode(&self) -> [u8; FRAME_SIZE] {
        let mut frame = [0u8; FRAME_SIZE];
        frame[0] = self.host_addr;
        frame[1] = self.device_addr;
        frame[2] = self.status.into();
        frame[3..7].copy_from_slice(&self.data.to_be_bytes());
        frame[7] = crc8(&frame[..7]);
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_layout() {
        let frame = Request::new(0x01, Command::SetAddress, 0x0002_0004).encode();
        assert_eq!(&frame[..7], &[0x55, 0x01, 0x0B, 0x00, 0x02, 0x00, 0x04]);
        assert_eq!(frame[7], crc8(&frame[..7]));
    }

    #[test]
    fn test_get_info_request_crc() {
        let frame = Request::new(DEFAULT_DEVICE_ADDR, Command::GetInfo, 0).encode();
        assert_eq!(frame, [0x55, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x15]);
    }

    #[test]
    fn test_reply_decode() {
        let reply = Reply {
            host_addr: DEFAULT_HOST_ADDR,
            device_addr: 0x01,
            status: Status::Ok,
            data: CHIP_TYPE_EXPECTED,
        };
        let frame = reply.encode();
        assert_eq!(&frame[3..7], &[0x54, 0x4D, 0x00, 0x01]);
        assert_eq!(Reply::decode(&frame).unwrap(), reply);
    }

    #[test]
    fn test_reply_bad_crc() {
        let mut frame = Reply {
            host_addr: 0xFF,
            device_addr: 0x01,
            status: Status::Ok,
            data: 0,
        }
        .encode();
        frame[7] ^= 0x01;
        assert!(Reply::decode(&frame).is_err());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::from(0x0E), Status::InvalidBank);
        assert_eq!(Status::from(0x12), Status::OtpError);
        assert_eq!(Status::from(0x42), Status::Unknown(0x42));
        assert!(Status::Ok.is_ok());
        assert!(!Status::Busy.is_ok());
        assert_eq!(Status::Busy.to_string(), "Busy(0x0F)");
    }
}
