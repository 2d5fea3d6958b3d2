//! 控制器配置（TOML）
//!
//! ```toml
//! segment_id = 3
//!
//! [network]
//! tcp_port = 5000
//! udp_port = 6000
//!
//! [imu]
//! sample_freq_hz = 100.0
//! beta = 0.1
//!
//! [[motors]]
//! port = "/dev/ttyUSB0"
//! ```

use crate::DriverError;
use crate::transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// 0 表示未配置
    pub segment_id: u8,
    pub network: NetworkConfig,
    pub imu: ImuConfig,
    pub motors: Vec<MotorConfig>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            segment_id: segment_protocol::SEGMENT_UNCONFIGURED,
            network: NetworkConfig::default(),
            imu: ImuConfig::default(),
            motors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bind_addr: String,
    pub tcp_port: u16,
    pub udp_port: u16,
    /// MotorState 遥测频率 (Hz)
    pub motor_state_hz: u32,
    /// Diagnostics 遥测频率 (Hz)
    pub diagnostics_hz: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            tcp_port: 5000,
            udp_port: 6000,
            motor_state_hz: 100,
            diagnostics_hz: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    pub sample_freq_hz: f32,
    pub beta: f32,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            sample_freq_hz: 100.0,
            beta: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotorConfig {
    /// 串口设备路径
    pub port: String,
    pub baud_rate: u32,
    pub device_addr: u8,
    pub host_addr: u8,
    pub reply_timeout_ms: u64,
    pub startup_delay_ms: u64,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            device_addr: segment_protocol::tmc9660::DEFAULT_DEVICE_ADDR,
            host_addr: segment_protocol::tmc9660::DEFAULT_HOST_ADDR,
            reply_timeout_ms: 100,
            startup_delay_ms: 10,
        }
    }
}

impl MotorConfig {
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            device_addr: self.device_addr,
            host_addr: self.host_addr,
            reply_timeout: Duration::from_millis(self.reply_timeout_ms),
            startup_delay: Duration::from_millis(self.startup_delay_ms),
        }
    }
}

impl ControllerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), DriverError> {
        if !(self.imu.sample_freq_hz > 0.0 && self.imu.sample_freq_hz.is_finite()) {
            return Err(DriverError::Config(format!(
                "Invalid imu.sample_freq_hz: {} (must be > 0)",
                self.imu.sample_freq_hz
            )));
        }
        if !(0.0..=1.0).contains(&self.imu.beta) {
            return Err(DriverError::Config(format!(
                "Invalid imu.beta: {} (must be within 0.0..=1.0)",
                self.imu.beta
            )));
        }
        if self.network.motor_state_hz == 0 || self.network.diagnostics_hz == 0 {
            return Err(DriverError::Config(
                "Telemetry rates must be > 0 Hz".to_string(),
            ));
        }
        for (i, motor) in self.motors.iter().enumerate() {
            if motor.port.is_empty() {
                return Err(DriverError::Config(format!("motors[{}].port is empty", i)));
            }
            if motor.reply_timeout_ms == 0 {
                return Err(DriverError::Config(format!(
                    "motors[{}].reply_timeout_ms must be > 0",
                    i
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::from_toml_str("").unwrap();
        assert_eq!(config.segment_id, 0);
        assert_eq!(config.network.tcp_port, 5000);
        assert_eq!(config.network.udp_port, 6000);
        assert_eq!(config.network.bind_addr, "0.0.0.0");
        assert_eq!(config.imu.sample_freq_hz, 100.0);
        assert_eq!(config.imu.beta, 0.1);
        assert!(config.motors.is_empty());
    }

    #[test]
    fn test_parse_full() {
        let text = r#"
            segment_id = 3

            [network]
            udp_port = 6100
            motor_state_hz = 50

            [imu]
            beta = 0.2

            [[motors]]
            port = "/dev/ttyUSB0"

            [[motors]]
            port = "/dev/ttyUSB1"
            device_addr = 2
            reply_timeout_ms = 50
        "#;
        let config = ControllerConfig::from_toml_str(text).unwrap();
        assert_eq!(config.segment_id, 3);
        assert_eq!(config.network.tcp_port, 5000);
        assert_eq!(config.network.udp_port, 6100);
        assert_eq!(config.network.motor_state_hz, 50);
        assert_eq!(config.imu.beta, 0.2);
        assert_eq!(config.motors.len(), 2);
        assert_eq!(config.motors[0].baud_rate, 115_200);

        let tc = config.motors[1].transport_config();
        assert_eq!(tc.device_addr, 2);
        assert_eq!(tc.host_addr, 0xFF);
        assert_eq!(tc.reply_timeout, Duration::from_millis(50));
        assert_eq!(tc.startup_delay, Duration::from_millis(10));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ControllerConfig::default();
        config.imu.sample_freq_hz = 0.0;
        assert!(matches!(config.validate(), Err(DriverError::Config(_))));

        let mut config = ControllerConfig::default();
        config.imu.beta = 2.0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.network.diagnostics_hz = 0;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.motors.push(MotorConfig::default());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = ControllerConfig::from_toml_str("segment_id = \"three\"").unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
    }
}
