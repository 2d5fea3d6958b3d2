//! 电机实例注册表
//!
//! 每个实例独立初始化：一个实例失败不影响其他实例，
//! 成功的实例在部分失败时仍然完全可用。

use crate::error::TransportError;
use crate::transport::MotorTransport;
use segment_serial::SerialChannel;
use tracing::{info, warn};

/// `init_all` 的逐实例结果
#[derive(Debug)]
pub struct InitReport {
    pub results: Vec<(String, Result<(), TransportError>)>,
}

impl InitReport {
    /// 全部实例初始化成功（空注册表视为成功）
    pub fn all_ok(&self) -> bool {
        self.results.iter().all(|(_, r)| r.is_ok())
    }

    pub fn ready_count(&self) -> usize {
        self.results.iter().filter(|(_, r)| r.is_ok()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &TransportError)> {
        self.results
            .iter()
            .filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
    }
}

pub struct MotorTransportRegistry<C = Box<dyn SerialChannel>> {
    motors: Vec<MotorTransport<C>>,
}

impl<C: SerialChannel> MotorTransportRegistry<C> {
    pub fn new(motors: Vec<MotorTransport<C>>) -> Self {
        Self { motors }
    }

    pub fn len(&self) -> usize {
        self.motors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MotorTransport<C>> {
        self.motors.get(index)
    }

    /// 已初始化的实例
    pub fn ready(&self, index: usize) -> Result<&MotorTransport<C>, TransportError> {
        match self.motors.get(index) {
            Some(motor) if motor.is_ready() => Ok(motor),
            _ => Err(TransportError::NotInitialized),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotorTransport<C>> {
        self.motors.iter()
    }

    /// 逐个初始化所有实例
    pub fn init_all(&self) -> InitReport {
        let results: Vec<_> = self
            .motors
            .iter()
            .map(|motor| (motor.name().to_string(), motor.init()))
            .collect();

        let report = InitReport { results };
        for (name, err) in report.failures() {
            warn!("{}: initialization failed: {}", name, err);
        }
        info!(
            "Motor drivers ready: {}/{}",
            report.ready_count(),
            self.motors.len()
        );
        report
    }
}

#[cfg(feature = "uart")]
impl MotorTransportRegistry {
    /// 由配置创建 UART 实例（此时不打开串口）
    pub fn from_config(motors: &[crate::config::MotorConfig]) -> Self {
        let motors = motors
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let channel: Box<dyn SerialChannel> =
                    Box::new(segment_serial::UartChannel::new(m.port.clone(), m.baud_rate));
                MotorTransport::new(format!("motor{}", i + 1), channel, m.transport_config())
            })
            .collect();
        Self::new(motors)
    }
}
