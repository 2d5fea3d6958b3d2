//! 协议常量定义
//!
//! 方向魔数、包类型码、包长度、工作模式以及线上错误码。

use crate::PacketError;

// ============================================================================
// 方向魔数（小端）
// ============================================================================

/// 命令方向魔数（上位机 → 段控制器）
pub const MAGIC_COMMAND: u16 = 0xAA55;

/// 反馈方向魔数（段控制器 → 上位机）
pub const MAGIC_FEEDBACK: u16 = 0xBB55;

/// 广播段 ID（所有段）
pub const SEGMENT_BROADCAST: u8 = 0xFF;

/// 未配置的段 ID
pub const SEGMENT_UNCONFIGURED: u8 = 0;

// ============================================================================
// 帧长度
// ============================================================================

/// 公共包头长度：magic(2) + type(1) + segment_id(1)
pub const HEADER_SIZE: usize = 4;

/// CRC16 尾部长度
pub const CRC16_SIZE: usize = 2;

/// 可接受的最短命令包（包头 + CRC）
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + CRC16_SIZE;

pub const TRAJECTORY_SIZE: usize = 112;
pub const EMERGENCY_STOP_SIZE: usize = 7;
pub const START_HOMING_SIZE: usize = 7;
pub const JOG_MOTOR_SIZE: usize = 13;
pub const SET_MODE_SIZE: usize = 7;
pub const SET_ZERO_OFFSET_SIZE: usize = 6;

pub const MOTOR_STATE_SIZE: usize = 83;
pub const DIAGNOSTICS_SIZE: usize = 26;

/// 每个段的电机数量
pub const MOTORS_PER_SEGMENT: usize = 3;

/// 七次多项式系数个数（a0..a7）
pub const TRAJECTORY_COEFFS: usize = 8;

// ============================================================================
// 包类型
// ============================================================================

/// 命令包类型（上位机 → 段控制器）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandType {
    Trajectory = 0x01,
    EmergencyStop = 0x02,
    StartHoming = 0x03,
    JogMotor = 0x07,
    SetMode = 0x08,
    SetZeroOffset = 0x09,
}

impl CommandType {
    /// 该类型的固定帧长（含包头与 CRC）
    pub const fn frame_size(self) -> usize {
        match self {
            CommandType::Trajectory => TRAJECTORY_SIZE,
            CommandType::EmergencyStop => EMERGENCY_STOP_SIZE,
            CommandType::StartHoming => START_HOMING_SIZE,
            CommandType::JogMotor => JOG_MOTOR_SIZE,
            CommandType::SetMode => SET_MODE_SIZE,
            CommandType::SetZeroOffset => SET_ZERO_OFFSET_SIZE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandType::Trajectory => "TRAJECTORY",
            CommandType::EmergencyStop => "EMERGENCY_STOP",
            CommandType::StartHoming => "START_HOMING",
            CommandType::JogMotor => "JOG_MOTOR",
            CommandType::SetMode => "SET_MODE",
            CommandType::SetZeroOffset => "SET_ZERO_OFFSET",
        }
    }
}

impl TryFrom<u8> for CommandType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(CommandType::Trajectory),
            0x02 => Ok(CommandType::EmergencyStop),
            0x03 => Ok(CommandType::StartHoming),
            0x07 => Ok(CommandType::JogMotor),
            0x08 => Ok(CommandType::SetMode),
            0x09 => Ok(CommandType::SetZeroOffset),
            _ => Err(PacketError::UnknownType { packet_type: value }),
        }
    }
}

/// 反馈包类型（段控制器 → 上位机）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TelemetryType {
    MotorState = 0x01,
    /// 电容阵列反馈（保留，本节点不产生）
    CapacitiveGrid = 0x02,
    Diagnostics = 0x03,
}

// ============================================================================
// 工作模式
// ============================================================================

/// 系统工作模式
///
/// 状态机：
/// - Idle → Homing（StartHoming）
/// - 任意 → Operation（SetMode=Operation）
/// - 任意 → Idle（SetMode=Idle 或 EmergencyStop）
///
/// Homing 不会自动完成，需要外部协作者。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Mode {
    #[default]
    Idle = 0x01,
    Homing = 0x02,
    Operation = 0x03,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Idle => "IDLE",
            Mode::Homing => "HOMING",
            Mode::Operation => "OPERATION",
        }
    }
}

impl TryFrom<u8> for Mode {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Mode::Idle),
            0x02 => Ok(Mode::Homing),
            0x03 => Ok(Mode::Operation),
            _ => Err(PacketError::InvalidField {
                field: "mode",
                value,
            }),
        }
    }
}

/// 回零方式（仅用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum HomingMode {
    /// 完整回零
    Full = 0x01,
    /// 快速校验
    QuickVerify = 0x02,
    #[num_enum(catch_all)]
    Other(u8),
}

/// 点动距离单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum JogUnit {
    Millimeters = 0x01,
    EncoderTicks = 0x02,
    #[num_enum(catch_all)]
    Other(u8),
}

// ============================================================================
// 错误码
// ============================================================================

/// 线上错误码（Diagnostics 包的 `last_error_code` 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    NoError = 0x00,
    EStopTriggered = 0x01,
    MotorOvercurrent = 0x02,
    PositionLimit = 0x03,
    CommunicationTimeout = 0x04,
    CrcError = 0x05,
    InvalidTrajectory = 0x06,
    EncoderFault = 0x07,
    Tmc9660Fault = 0x08,
    ImuFault = 0x09,
    CapacitiveFault = 0x0A,
    FlashError = 0x0B,
    BufferOverrun = 0x0C,
    TemperatureHigh = 0x0D,
    #[num_enum(catch_all)]
    Unknown(u8),
}

// num_enum 不允许 `#[default]` 与 `catch_all` 共存，手写 Default
impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::NoError
    }
}

impl ErrorCode {
    pub fn is_error(self) -> bool {
        self != ErrorCode::NoError
    }
}
