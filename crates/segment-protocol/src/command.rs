//! 命令包（上位机 → 段控制器）
//!
//! 帧格式：`magic(2, LE) | type(1) | segment_id(1) | payload | crc16(2, LE)`
//!
//! 解析顺序固定：最短长度 → 魔数 → CRC16 → 类型 → 该类型的固定长度 → 字段。
//! 长度不匹配时不会解码负载。

use crate::codec::{FieldReader, FieldWriter};
use crate::constants::*;
use crate::crc::{crc16_ccitt, crc16_trailer};
use crate::PacketError;

// ============================================================================
// 负载结构
// ============================================================================

/// 轨迹指令 (0x01)，112 字节
///
/// 每个电机一组七次多项式系数 a0..a7。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryCommand {
    pub segment_id: u8,
    pub trajectory_id: u32,
    /// 起始时间（开机后毫秒）
    pub start_timestamp_ms: u32,
    pub duration_ms: u16,
    pub coeffs: [[f32; TRAJECTORY_COEFFS]; MOTORS_PER_SEGMENT],
}

/// 急停 (0x02)，7 字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmergencyStopCommand {
    /// 目标段（0xFF = 广播）
    pub segment_id: u8,
    pub stop_reason: u8,
}

/// 开始回零 (0x03)，7 字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHomingCommand {
    pub segment_id: u8,
    pub homing_mode: HomingMode,
}

/// 点动电机 (0x07)，13 字节
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JogMotorCommand {
    pub segment_id: u8,
    /// 电机编号 1..=3
    pub motor_id: u8,
    pub unit: JogUnit,
    pub value: f32,
    /// 0-100%
    pub speed_percent: u8,
}

/// 设置模式 (0x08)，7 字节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetModeCommand {
    pub segment_id: u8,
    pub mode: Mode,
}

/// 设置零点偏移 (0x09)，6 字节（无负载）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetZeroOffsetCommand {
    pub segment_id: u8,
}

/// 已校验的命令帧
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandFrame {
    Trajectory(TrajectoryCommand),
    EmergencyStop(EmergencyStopCommand),
    StartHoming(StartHomingCommand),
    JogMotor(JogMotorCommand),
    SetMode(SetModeCommand),
    SetZeroOffset(SetZeroOffsetCommand),
}

impl CommandFrame {
    pub fn command_type(&self) -> CommandType {
        match self {
            CommandFrame::Trajectory(_) => CommandType::Trajectory,
            CommandFrame::EmergencyStop(_) => CommandType::EmergencyStop,
            CommandFrame::StartHoming(_) => CommandType::StartHoming,
            CommandFrame::JogMotor(_) => CommandType::JogMotor,
            CommandFrame::SetMode(_) => CommandType::SetMode,
            CommandFrame::SetZeroOffset(_) => CommandType::SetZeroOffset,
        }
    }

    /// 包头中的目标段 ID
    pub fn segment_id(&self) -> u8 {
        match self {
            CommandFrame::Trajectory(c) => c.segment_id,
            CommandFrame::EmergencyStop(c) => c.segment_id,
            CommandFrame::StartHoming(c) => c.segment_id,
            CommandFrame::JogMotor(c) => c.segment_id,
            CommandFrame::SetMode(c) => c.segment_id,
            CommandFrame::SetZeroOffset(c) => c.segment_id,
        }
    }

    /// 编码为完整线上帧（含 CRC16 尾部）
    pub fn encode(&self) -> Vec<u8> {
        let ty = self.command_type();
        let mut w = FieldWriter::with_capacity(ty.frame_size());
        w.u16(MAGIC_COMMAND).u8(ty as u8).u8(self.segment_id());

        match self {
            CommandFrame::Trajectory(c) => {
                w.u32(c.trajectory_id)
                    .u32(c.start_timestamp_ms)
                    .u16(c.duration_ms);
                for motor in &c.coeffs {
                    w.f32_slice(motor);
                }
            },
            CommandFrame::EmergencyStop(c) => {
                w.u8(c.stop_reason);
            },
            CommandFrame::StartHoming(c) => {
                w.u8(c.homing_mode.into());
            },
            CommandFrame::JogMotor(c) => {
                w.u8(c.motor_id)
                    .u8(c.unit.into())
                    .f32(c.value)
                    .u8(c.speed_percent);
            },
            CommandFrame::SetMode(c) => {
                w.u8(c.mode as u8);
            },
            CommandFrame::SetZeroOffset(_) => {},
        }

        w.finish_with_crc16()
    }
}

/// 解析并校验一个命令包
///
/// # 错误
///
/// - `TooShort`: 少于 6 字节
/// - `MagicMismatch`: 魔数不是 0xAA55
/// - `ChecksumError`: CRC16 不匹配
/// - `UnknownType`: 未知类型字节
/// - `SizeMismatch`: 长度与该类型固定长度不符
/// - `InvalidField`: 枚举字段取值非法（SetMode 的 mode）
pub fn parse(buf: &[u8]) -> Result<CommandFrame, PacketError> {
    if buf.len() < MIN_PACKET_SIZE {
        return Err(PacketError::TooShort { len: buf.len() });
    }

    let magic = u16::from_le_bytes([buf[0], buf[1]]);
    if magic != MAGIC_COMMAND {
        return Err(PacketError::MagicMismatch {
            expected: MAGIC_COMMAND,
            actual: magic,
        });
    }

    let body = &buf[..buf.len() - CRC16_SIZE];
    let computed = crc16_ccitt(body);
    let trailer = crc16_trailer(buf).unwrap_or_default();
    if computed != trailer {
        return Err(PacketError::ChecksumError {
            expected: computed,
            actual: trailer,
        });
    }

    let ty = CommandType::try_from(buf[2])?;
    if buf.len() != ty.frame_size() {
        return Err(PacketError::SizeMismatch {
            packet_type: ty as u8,
            expected: ty.frame_size(),
            actual: buf.len(),
        });
    }

    let segment_id = buf[3];
    let mut r = FieldReader::new(buf, HEADER_SIZE);

    let frame = match ty {
        CommandType::Trajectory => {
            let trajectory_id = r.u32();
            let start_timestamp_ms = r.u32();
            let duration_ms = r.u16();
            let coeffs = [r.f32_array(), r.f32_array(), r.f32_array()];
            CommandFrame::Trajectory(TrajectoryCommand {
                segment_id,
                trajectory_id,
                start_timestamp_ms,
                duration_ms,
                coeffs,
            })
        },
        CommandType::EmergencyStop => CommandFrame::EmergencyStop(EmergencyStopCommand {
            segment_id,
            stop_reason: r.u8(),
        }),
        CommandType::StartHoming => CommandFrame::StartHoming(StartHomingCommand {
            segment_id,
            homing_mode: HomingMode::from(r.u8()),
        }),
        CommandType::JogMotor => CommandFrame::JogMotor(JogMotorCommand {
            segment_id,
            motor_id: r.u8(),
            unit: JogUnit::from(r.u8()),
            value: r.f32(),
            speed_percent: r.u8(),
        }),
        CommandType::SetMode => CommandFrame::SetMode(SetModeCommand {
            segment_id,
            mode: Mode::try_from(r.u8())?,
        }),
        CommandType::SetZeroOffset => CommandFrame::SetZeroOffset(SetZeroOffsetCommand { segment_id }),
    };

    Ok(frame)
}
