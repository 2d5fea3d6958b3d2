//! TMC9660 UART 传输层
//!
//! 每个电机实例拥有独立的串口链路和独立的互斥锁，实例之间互不阻塞。
//! 一次事务 = 发送 8 字节请求 + 在截止时间内读取 8 字节应答。
//!
//! # 缓存语义
//!
//! - `set_bank`: 与缓存相同则不发送；成功后更新缓存
//! - `set_address`: 总是发送（部分命令会自增地址）；成功后更新缓存
//! - 事务失败时缓存既不更新也不失效
//!
//! 组合操作（`read_config`/`write_config`/`init`）在整个过程中持有该实例的锁。

use crate::error::TransportError;
use parking_lot::Mutex;
use segment_protocol::tmc9660::{
    BANK_UNSELECTED, Bank, CHIP_TYPE_EXPECTED, CHIP_VARIANT_EXPECTED, CONFIG_BASE_ADDR,
    CONFIG_SIZE, Command, DEFAULT_DEVICE_ADDR, DEFAULT_HOST_ADDR, FRAME_SIZE, InfoSelector, Reply,
    Request,
};
use segment_serial::SerialChannel;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 默认应答超时
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(100);

/// 默认上电稳定等待
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(10);

/// 单个实例的链路参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    pub device_addr: u8,
    pub host_addr: u8,
    pub reply_timeout: Duration,
    pub startup_delay: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device_addr: DEFAULT_DEVICE_ADDR,
            host_addr: DEFAULT_HOST_ADDR,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            startup_delay: DEFAULT_STARTUP_DELAY,
        }
    }
}

/// 实例状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotorTransportState {
    pub device_addr: u8,
    pub host_addr: u8,
    /// 当前选择的存储区（`BANK_UNSELECTED` 表示未选择）
    pub current_bank: u8,
    pub current_addr: u32,
    pub initialized: bool,
    pub chip_type: u32,
    pub chip_version: u32,
    pub bootloader_version: u32,
}

impl MotorTransportState {
    fn new(config: &TransportConfig) -> Self {
        Self {
            device_addr: config.device_addr,
            host_addr: config.host_addr,
            current_bank: BANK_UNSELECTED,
            current_addr: 0,
            initialized: false,
            chip_type: 0,
            chip_version: 0,
            bootloader_version: 0,
        }
    }
}

struct Link<C> {
    channel: C,
    state: MotorTransportState,
    reply_timeout: Duration,
    startup_delay: Duration,
}

/// 一个电机驱动器实例
pub struct MotorTransport<C = Box<dyn SerialChannel>> {
    name: String,
    link: Mutex<Link<C>>,
}

impl<C: SerialChannel> MotorTransport<C> {
    pub fn new(name: impl Into<String>, channel: C, config: TransportConfig) -> Self {
        Self {
            name: name.into(),
            link: Mutex::new(Link {
                channel,
                state: MotorTransportState::new(&config),
                reply_timeout: config.reply_timeout,
                startup_delay: config.startup_delay,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.link.lock().state.initialized
    }

    pub fn get_state(&self) -> MotorTransportState {
        self.link.lock().state
    }

    /// 原始事务：返回应答数据
    ///
    /// 设备状态非 OK 时返回 `DeviceStatus`，其中仍携带应答数据。
    pub fn transact(&self, command: Command, value: u32) -> Result<u32, TransportError> {
        self.link.lock().transact(command, value)
    }

    pub fn get_info(&self, selector: InfoSelector) -> Result<u32, TransportError> {
        self.link.lock().transact(Command::GetInfo, selector as u32)
    }

    pub fn set_bank(&self, bank: Bank) -> Result<(), TransportError> {
        self.link.lock().set_bank(bank)
    }

    pub fn set_address(&self, addr: u32) -> Result<(), TransportError> {
        self.link.lock().set_address(addr)
    }

    pub fn read_32(&self) -> Result<u32, TransportError> {
        self.link.lock().transact(Command::Read32, 0)
    }

    pub fn write_32(&self, value: u32) -> Result<(), TransportError> {
        self.link.lock().transact(Command::Write32, value).map(|_| ())
    }

    /// 通信测试
    pub fn no_op(&self) -> Result<(), TransportError> {
        self.link.lock().transact(Command::NoOp, 0).map(|_| ())
    }

    /// 读取 CONFIG 寄存器（偏移 < 64 且 4 字节对齐）
    pub fn read_config(&self, offset: u8) -> Result<u32, TransportError> {
        check_config_offset(offset)?;
        let mut link = self.link.lock();
        link.select_config(offset)?;
        link.transact(Command::Read32, 0)
    }

    /// 写入 CONFIG 寄存器（触发芯片运行时重配置）
    pub fn write_config(&self, offset: u8, value: u32) -> Result<(), TransportError> {
        check_config_offset(offset)?;
        let mut link = self.link.lock();
        link.select_config(offset)?;
        info!("{}: writing CONFIG[0x{:02X}] = 0x{:08X}", self.name, offset, value);
        link.transact(Command::Write32, value).map(|_| ())
    }

    /// 打开链路并校验芯片
    ///
    /// 芯片类型读取失败时实例保持未初始化，不重试。
    /// 芯片版本与引导程序版本为尽力读取，失败只记录日志。
    pub fn init(&self) -> Result<(), TransportError> {
        let mut link = self.link.lock();
        link.state.initialized = false;

        link.channel.open().map_err(|e| {
            error!("{}: failed to open {}: {}", self.name, link.channel.describe(), e);
            TransportError::from(e)
        })?;
        info!("{}: link {} open", self.name, link.channel.describe());

        spin_sleep::sleep(link.startup_delay);

        let chip_type = match link.transact(Command::GetInfo, InfoSelector::ChipType as u32) {
            Ok(v) => v,
            Err(e) => {
                error!(
                    "{}: failed to read chip type, instance stays uninitialized: {}",
                    self.name, e
                );
                return Err(e);
            },
        };

        link.state.chip_type = chip_type;
        if chip_type != CHIP_TYPE_EXPECTED {
            error!(
                "{}: unexpected chip type 0x{:08X} (expected 0x{:08X})",
                self.name, chip_type, CHIP_TYPE_EXPECTED
            );
            return Err(TransportError::DeviceMismatch {
                expected: CHIP_TYPE_EXPECTED,
                actual: chip_type,
            });
        }
        info!("{}: chip type verified: 0x{:08X}", self.name, chip_type);

        match link.transact(Command::GetInfo, InfoSelector::ChipVersion as u32) {
            Ok(v) => {
                link.state.chip_version = v;
                if v == CHIP_VARIANT_EXPECTED {
                    info!("{}: chip version {}", self.name, v);
                } else {
                    warn!(
                        "{}: unexpected chip version {} (expected {})",
                        self.name, v, CHIP_VARIANT_EXPECTED
                    );
                }
            },
            Err(e) => warn!("{}: chip version unavailable: {}", self.name, e),
        }

        match link.transact(Command::GetInfo, InfoSelector::BootloaderVersion as u32) {
            Ok(v) => {
                link.state.bootloader_version = v;
                info!("{}: bootloader version {}.{}", self.name, v >> 16, v & 0xFFFF);
            },
            Err(e) => warn!("{}: bootloader version unavailable: {}", self.name, e),
        }

        link.state.initialized = true;
        info!("{}: TMC9660 initialized", self.name);
        Ok(())
    }
}

impl<C: SerialChannel> Link<C> {
    fn transact(&mut self, command: Command, value: u32) -> Result<u32, TransportError> {
        let request = Request::new(self.state.device_addr, command, value).encode();

        self.channel.clear_input()?;
        self.channel.send(&request)?;

        let mut frame = [0u8; FRAME_SIZE];
        if let Err(e) = self.channel.receive_exact(&mut frame, self.reply_timeout) {
            let err = TransportError::from(e);
            warn!("{:?} (0x{:08X}) failed: {}", command, value, err);
            return Err(err);
        }

        let reply = Reply::decode(&frame).map_err(|e| {
            warn!("{:?} reply rejected: {}", command, e);
            TransportError::Checksum {
                expected: e.expected,
                actual: e.actual,
            }
        })?;

        if reply.device_addr != self.state.device_addr {
            warn!(
                "Device address mismatch: got 0x{:02X}, expected 0x{:02X}",
                reply.device_addr, self.state.device_addr
            );
        }

        if !reply.status.is_ok() {
            warn!("Command {:?} returned status {}", command, reply.status);
            return Err(TransportError::DeviceStatus {
                status: reply.status,
                value: reply.data,
            });
        }

        Ok(reply.data)
    }

    fn set_bank(&mut self, bank: Bank) -> Result<(), TransportError> {
        if self.state.current_bank == bank as u8 {
            return Ok(());
        }
        self.transact(Command::SetBank, bank as u32)?;
        self.state.current_bank = bank as u8;
        debug!("Set bank to {:?}", bank);
        Ok(())
    }

    fn set_address(&mut self, addr: u32) -> Result<(), TransportError> {
        self.transact(Command::SetAddress, addr)?;
        self.state.current_addr = addr;
        debug!("Set address to 0x{:08X}", addr);
        Ok(())
    }

    fn select_config(&mut self, offset: u8) -> Result<(), TransportError> {
        self.set_bank(Bank::Config)?;
        self.set_address(CONFIG_BASE_ADDR + offset as u32)
    }
}

fn check_config_offset(offset: u8) -> Result<(), TransportError> {
    if offset >= CONFIG_SIZE || offset % 4 != 0 {
        error!("CONFIG offset {} must be < {} and 4-byte aligned", offset, CONFIG_SIZE);
        return Err(TransportError::Alignment { offset });
    }
    Ok(())
}
