//! 遥测包（段控制器 → 上位机）
//!
//! 本节点只负责编码；`decode` 供上位机工具与测试使用。

use crate::codec::{FieldReader, FieldWriter};
use crate::constants::*;
use crate::crc::crc16_verify;
use crate::PacketError;
use bilge::prelude::*;

// ============================================================================
// 状态位
// ============================================================================

/// MotorState 包的状态位
///
/// bilge 默认 LSB first，Bit 0 对应第一个字段。
/// - Bit 0: 急停锁存
/// - Bit 1: 回零中
/// - Bit 2: 位置限位（未实现，恒 0）
/// - Bit 3: 力限位（未实现，恒 0）
/// - Bit 4: 轨迹缓冲区空（未实现，恒 0）
/// - Bit 5: 轨迹执行中（mode = Operation）
/// - Bit 6: 标定有效（未实现，恒 0）
/// - Bit 7: 存在错误（last_error ≠ NoError）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub estop_active: bool,
    pub homing_in_progress: bool,
    pub position_limit: bool,
    pub force_limit: bool,
    pub buffer_empty: bool,
    pub trajectory_executing: bool,
    pub calibration_valid: bool,
    pub error_present: bool,
}

impl StatusFlags {
    pub fn from_byte(byte: u8) -> Self {
        StatusFlags::from(u8::new(byte))
    }

    pub fn to_byte(self) -> u8 {
        u8::from(self).value()
    }
}

// ============================================================================
// MotorState (0x01)
// ============================================================================

/// 单个电机的运动学快照
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorKinematics {
    pub position: f32,
    pub velocity: f32,
    pub acceleration: f32,
    pub jerk: f32,
    pub current: f32,
}

/// 电机状态遥测帧，83 字节
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotorStateFrame {
    pub segment_id: u8,
    /// 开机后毫秒
    pub timestamp_ms: u32,
    pub motors: [MotorKinematics; MOTORS_PER_SEGMENT],
    /// 弧度
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub status_flags: StatusFlags,
}

impl MotorStateFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::with_capacity(MOTOR_STATE_SIZE);
        w.u16(MAGIC_FEEDBACK)
            .u8(TelemetryType::MotorState as u8)
            .u8(self.segment_id)
            .u32(self.timestamp_ms);
        for m in &self.motors {
            w.f32(m.position)
                .f32(m.velocity)
                .f32(m.acceleration)
                .f32(m.jerk)
                .f32(m.current);
        }
        w.f32(self.roll)
            .f32(self.pitch)
            .f32(self.yaw)
            .u8(self.status_flags.to_byte());
        w.finish_with_crc16()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        check_feedback_frame(buf, TelemetryType::MotorState, MOTOR_STATE_SIZE)?;

        let mut r = FieldReader::new(buf, HEADER_SIZE);
        let timestamp_ms = r.u32();
        let mut motors = [MotorKinematics::default(); MOTORS_PER_SEGMENT];
        for m in motors.iter_mut() {
            *m = MotorKinematics {
                position: r.f32(),
                velocity: r.f32(),
                acceleration: r.f32(),
                jerk: r.f32(),
                current: r.f32(),
            };
        }

        Ok(Self {
            segment_id: buf[3],
            timestamp_ms,
            motors,
            roll: r.f32(),
            pitch: r.f32(),
            yaw: r.f32(),
            status_flags: StatusFlags::from_byte(r.u8()),
        })
    }
}

// ============================================================================
// Diagnostics (0x03)
// ============================================================================

/// 诊断帧尾部 CRC 之前的保留字节数（固定为 0）
pub const DIAGNOSTICS_RESERVED: usize = 4;

/// 诊断遥测帧，26 字节
///
/// 布局：包头(4) | timestamp u32 | driver_temp f32 | board_temp f32 |
/// error_count u16 | last_error u8 | cpu u8 | 保留(4) | crc16
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiagnosticsFrame {
    pub segment_id: u8,
    pub timestamp_ms: u32,
    /// 摄氏度
    pub driver_temp_avg: f32,
    pub board_temp: f32,
    pub error_count: u16,
    pub last_error_code: ErrorCode,
    pub cpu_usage_percent: u8,
}

impl DiagnosticsFrame {
    pub fn encode(&self) -> Vec<u8> {
        let mut w = FieldWriter::with_capacity(DIAGNOSTICS_SIZE);
        w.u16(MAGIC_FEEDBACK)
            .u8(TelemetryType::Diagnostics as u8)
            .u8(self.segment_id)
            .u32(self.timestamp_ms)
            .f32(self.driver_temp_avg)
            .f32(self.board_temp)
            .u16(self.error_count)
            .u8(self.last_error_code.into())
            .u8(self.cpu_usage_percent)
            .zeros(DIAGNOSTICS_RESERVED);
        w.finish_with_crc16()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        check_feedback_frame(buf, TelemetryType::Diagnostics, DIAGNOSTICS_SIZE)?;

        let mut r = FieldReader::new(buf, HEADER_SIZE);
        let frame = Self {
            segment_id: buf[3],
            timestamp_ms: r.u32(),
            driver_temp_avg: r.f32(),
            board_temp: r.f32(),
            error_count: r.u16(),
            last_error_code: ErrorCode::from(r.u8()),
            cpu_usage_percent: r.u8(),
        };
        r.skip(DIAGNOSTICS_RESERVED);
        Ok(frame)
    }
}

/// 反馈方向的帧头/CRC/长度校验
fn check_feedback_frame(buf: &[u8], ty: TelemetryType, size: usize) -> Result<(), PacketError> {
    if buf.len() < MIN_PACKET_SIZE {
        return Err(PacketError::TooShort { len: buf.len() });
    }
    let magic = u16::from_le_bytes([buf[0], buf[1]]);
    if magic != MAGIC_FEEDBACK {
        return Err(PacketError::MagicMismatch {
            expected: MAGIC_FEEDBACK,
            actual: magic,
        });
    }
    if !crc16_verify(buf) {
        let body = &buf[..buf.len() - CRC16_SIZE];
        return Err(PacketError::ChecksumError {
            expected: crate::crc::crc16_ccitt(body),
            actual: u16::from_le_bytes([buf[buf.len() - 2], buf[buf.len() - 1]]),
        });
    }
    if buf[2] != ty as u8 {
        return Err(PacketError::UnknownType { packet_type: buf[2] });
    }
    if buf.len() != size {
        return Err(PacketError::SizeMismatch {
            packet_type: ty as u8,
            expected: size,
            actual: buf.len(),
        });
    }
    Ok(())
}
