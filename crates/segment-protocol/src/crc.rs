//! 校验和算法
//!
//! - CRC16-CCITT：多项式 0x1021，初值 0xFFFF，MSB 优先，无反射、无异或输出。
//!   用于命令/遥测网络包，尾部以小端追加。
//! - CRC8：多项式 0x07（x⁸+x²+x+1），初值 0x00。用于 TMC9660 UART 帧的前 7 字节。

/// CRC16-CCITT 初值
pub const CRC16_INIT: u16 = 0xFFFF;

const CRC16_POLY: u16 = 0x1021;
const CRC8_POLY: u8 = 0x07;

/// 计算 CRC16-CCITT
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    crc16_ccitt_update(CRC16_INIT, data)
}

/// 以给定种子继续计算 CRC16-CCITT
pub fn crc16_ccitt_update(seed: u16, data: &[u8]) -> u16 {
    let mut crc = seed;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ CRC16_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// 读取帧尾部的小端 CRC16
///
/// 帧长小于 2 时返回 `None`。
pub fn crc16_trailer(frame: &[u8]) -> Option<u16> {
    let n = frame.len();
    if n < 2 {
        return None;
    }
    Some(u16::from_le_bytes([frame[n - 2], frame[n - 1]]))
}

/// 校验带 CRC16 尾部的完整帧
pub fn crc16_verify(frame: &[u8]) -> bool {
    match crc16_trailer(frame) {
        Some(trailer) => crc16_ccitt(&frame[..frame.len() - 2]) == trailer,
        None => false,
    }
}

/// 计算 TMC9660 UART 帧使用的 CRC8
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}
