//! 段控制器主入口
//!
//! 通过 TCP/UDP 接收上位机命令，向 TMC9660 驱动器转发，并回报遥测。

mod server;
mod stream;

use anyhow::Result;
use clap::Parser;
use segment_driver::ControllerConfig;
use server::Controller;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 段控制器
#[derive(Parser, Debug)]
#[command(name = "segment-controller")]
#[command(about = "Segment controller - command relay, telemetry and orientation estimation", long_about = None)]
struct Args {
    /// TOML 配置文件（缺省时使用内置默认值）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 段 ID（覆盖配置文件）
    #[arg(long)]
    segment_id: Option<u8>,

    /// TCP 命令端口（覆盖配置文件）
    #[arg(long)]
    tcp_port: Option<u16>,

    /// UDP 命令/遥测端口（覆盖配置文件）
    #[arg(long)]
    udp_port: Option<u16>,
}

impl Args {
    /// 加载配置并应用命令行覆盖
    fn resolve_config(&self) -> Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::load(path)?,
            None => ControllerConfig::default(),
        };
        if let Some(segment_id) = self.segment_id {
            config.segment_id = segment_id;
        }
        if let Some(port) = self.tcp_port {
            config.network.tcp_port = port;
        }
        if let Some(port) = self.udp_port {
            config.network.udp_port = port;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("segment_controller=info".parse().unwrap()),
        )
        .init();

    let args = Args::parse();
    let config = args.resolve_config()?;
    if let Some(path) = &args.config {
        info!("Loaded configuration from {}", path.display());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, shutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");

    Controller::new(config, running).run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let args = Args::parse_from([
            "segment-controller",
            "--segment-id",
            "7",
            "--tcp-port",
            "15000",
        ]);
        let config = args.resolve_config().unwrap();
        assert_eq!(config.segment_id, 7);
        assert_eq!(config.network.tcp_port, 15000);
        assert_eq!(config.network.udp_port, 6000);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let args = Args::parse_from([
            "segment-controller",
            "--config",
            "/nonexistent/segment-controller.toml",
        ]);
        assert!(args.resolve_config().is_err());
    }
}
