//! 命令调度与遥测构建
//!
//! TCP 与 UDP 两条投递路径各自在线程中调用 [`Dispatcher::handle`]，
//! 遥测线程调用 `build_*`。所有对 [`SystemState`] 的读写都经过同一把锁。

use crate::imu::ImuState;
use crate::state::SystemState;
use crate::uptime_ms;
use parking_lot::Mutex;
use segment_protocol::{
    CommandFrame, CommandType, DiagnosticsFrame, EmergencyStopCommand, JogMotorCommand, Mode,
    MotorKinematics, MotorStateFrame, PacketError, SetModeCommand, StartHomingCommand,
    StatusFlags, TrajectoryCommand, MOTORS_PER_SEGMENT,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

// 诊断占位值（温度/CPU 采集未实现）
const DRIVER_TEMP_PLACEHOLDER: f32 = 25.0;
const BOARD_TEMP_PLACEHOLDER: f32 = 30.0;
const CPU_USAGE_PLACEHOLDER: u8 = 10;

pub struct Dispatcher {
    state: Mutex<SystemState>,
    imu: ImuState,
    start: Instant,
}

impl Dispatcher {
    pub fn new(segment_id: u8, imu: ImuState) -> Self {
        Self::with_start(segment_id, imu, Instant::now())
    }

    /// 使用外部给定的启动时刻（与其他组件共享时间基准）
    pub fn with_start(segment_id: u8, imu: ImuState, start: Instant) -> Self {
        Self {
            state: Mutex::new(SystemState::new(segment_id)),
            imu,
            start,
        }
    }

    pub fn set_segment_id(&self, segment_id: u8) {
        self.state.lock().segment_id = segment_id;
        info!("Segment ID set to {}", segment_id);
    }

    pub fn segment_id(&self) -> u8 {
        self.state.lock().segment_id
    }

    pub fn system_snapshot(&self) -> SystemState {
        *self.state.lock()
    }

    pub fn imu(&self) -> &ImuState {
        &self.imu
    }

    /// 解析并处理一个入站缓冲区
    ///
    /// 任何错误只记录到系统状态（错误计数 + 最后错误码），调用方继续处理后续包。
    pub fn handle(&self, buf: &[u8]) -> Result<CommandType, PacketError> {
        let parsed = segment_protocol::parse(buf);
        let mut state = self.state.lock();

        match parsed {
            Ok(frame) => {
                route(&mut state, &frame);
                Ok(frame.command_type())
            },
            Err(e) => {
                state.record_error(e.error_code());
                warn!("Dropped packet ({} bytes): {}", buf.len(), e);
                Err(e)
            },
        }
    }

    pub fn status_flags(&self) -> StatusFlags {
        status_flags_for(&self.state.lock())
    }

    /// 构建 MotorState 遥测帧（83 字节）
    ///
    /// 电机运动学为零占位；姿态无效时 roll/pitch/yaw 为 0。
    pub fn build_motor_state(&self, segment_id: u8) -> Vec<u8> {
        let orientation = self.imu.orientation().unwrap_or_default();
        let status_flags = self.status_flags();

        MotorStateFrame {
            segment_id,
            timestamp_ms: uptime_ms(self.start),
            motors: [MotorKinematics::default(); MOTORS_PER_SEGMENT],
            roll: orientation.roll,
            pitch: orientation.pitch,
            yaw: orientation.yaw,
            status_flags,
        }
        .encode()
    }

    /// 构建 Diagnostics 遥测帧（26 字节）
    pub fn build_diagnostics(&self, segment_id: u8) -> Vec<u8> {
        let (error_count, last_error_code) = {
            let state = self.state.lock();
            (state.error_count, state.last_error)
        };

        DiagnosticsFrame {
            segment_id,
            timestamp_ms: uptime_ms(self.start),
            driver_temp_avg: DRIVER_TEMP_PLACEHOLDER,
            board_temp: BOARD_TEMP_PLACEHOLDER,
            error_count,
            last_error_code,
            cpu_usage_percent: CPU_USAGE_PLACEHOLDER,
        }
        .encode()
    }
}

/// 状态位：bit0 急停、bit1 回零、bit5 Operation、bit7 存在错误，其余恒 0
pub fn status_flags_for(state: &SystemState) -> StatusFlags {
    let mut flags = StatusFlags::default();
    flags.set_estop_active(state.estop_active);
    flags.set_homing_in_progress(state.mode == Mode::Homing);
    flags.set_trajectory_executing(state.mode == Mode::Operation);
    flags.set_error_present(state.last_error.is_error());
    flags
}

fn route(state: &mut SystemState, frame: &CommandFrame) {
    match frame {
        CommandFrame::EmergencyStop(cmd) => handle_emergency_stop(state, cmd),
        CommandFrame::SetMode(cmd) => handle_set_mode(state, cmd),
        CommandFrame::StartHoming(cmd) => handle_start_homing(state, cmd),
        CommandFrame::JogMotor(cmd) => handle_jog_motor(cmd),
        CommandFrame::Trajectory(cmd) => handle_trajectory(cmd),
        CommandFrame::SetZeroOffset(_) => {
            info!("Set zero offset requested (calibration storage not available)");
        },
    }
}

fn handle_emergency_stop(state: &mut SystemState, cmd: &EmergencyStopCommand) {
    if !state.is_addressed(cmd.segment_id) {
        debug!(
            "Ignoring EMERGENCY_STOP for segment {} (own id {})",
            cmd.segment_id, state.segment_id
        );
        return;
    }
    state.trigger_estop();
    error!("EMERGENCY STOP (reason 0x{:02X})", cmd.stop_reason);
}

fn handle_set_mode(state: &mut SystemState, cmd: &SetModeCommand) {
    let previous = state.mode;
    let latched = state.estop_active;
    state.set_mode(cmd.mode);
    if latched && !state.estop_active {
        warn!("Emergency stop latch cleared by mode change to OPERATION");
    }
    info!("Mode {} -> {}", previous.name(), cmd.mode.name());
}

fn handle_start_homing(state: &mut SystemState, cmd: &StartHomingCommand) {
    state.mode = Mode::Homing;
    info!("Homing started (mode {:?})", cmd.homing_mode);
}

fn handle_jog_motor(cmd: &JogMotorCommand) {
    info!(
        "Jog motor {}: {} ({:?}) at {}%",
        cmd.motor_id, cmd.value, cmd.unit, cmd.speed_percent
    );
}

fn handle_trajectory(cmd: &TrajectoryCommand) {
    info!(
        "Trajectory {} received: start {} ms, duration {} ms",
        cmd.trajectory_id, cmd.start_timestamp_ms, cmd.duration_ms
    );
}
