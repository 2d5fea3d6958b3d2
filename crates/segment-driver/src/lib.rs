//! # Segment Driver
//!
//! 段控制器的有状态核心：
//! - 命令调度与系统状态（单一互斥锁）
//! - 遥测帧构建
//! - TMC9660 电机驱动器传输（每实例独立锁，bank/address 缓存）
//! - Madgwick 姿态估计与原子姿态快照（ArcSwap 无锁读取）
//! - 控制器配置
//!
//! 本 crate 不包含网络监听，投递路径由宿主程序提供。

pub mod ahrs;
pub mod config;
pub mod dispatcher;
mod error;
pub mod imu;
pub mod registry;
pub mod state;
pub mod transport;

pub use ahrs::{EulerAngles, MadgwickFilter};
pub use config::{ControllerConfig, ImuConfig, MotorConfig, NetworkConfig};
pub use dispatcher::Dispatcher;
pub use error::{DriverError, TransportError};
pub use imu::{ImuSample, ImuSnapshot, ImuState, ImuUpdater, SensorSource, StationarySource};
pub use registry::{InitReport, MotorTransportRegistry};
pub use state::SystemState;
pub use transport::{MotorTransport, MotorTransportState, TransportConfig};

use std::time::Instant;

/// 自 `start` 起的毫秒数（u32 回绕）
pub fn uptime_ms(start: Instant) -> u32 {
    start.elapsed().as_millis() as u32
}
