//! 测试公共设施：模拟 TMC9660 引导加载器

#![allow(dead_code)]

use parking_lot::Mutex;
use segment_driver::{MotorTransport, TransportConfig};
use segment_protocol::tmc9660::{
    CHIP_TYPE_EXPECTED, Command, DEFAULT_HOST_ADDR, FRAME_SIZE, InfoSelector, Reply, Status,
};
use segment_protocol::crc8;
use segment_serial::{MockChannel, SerialChannel, mock::Transcript};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const BOOTLOADER_VERSION: u32 = 0x0001_0003;
pub const CHIP_VERSION: u32 = 2;

/// 芯片内部状态
#[derive(Debug, Default)]
pub struct ChipState {
    pub chip_type: u32,
    pub chip_version: u32,
    pub bank: u8,
    pub addr: u32,
    pub memory: HashMap<(u8, u32), u32>,
    /// 对该命令返回指定状态
    pub fail_command: Option<(u8, Status)>,
    /// 应答中使用的设备地址（None = 回显请求地址）
    pub reply_device_addr: Option<u8>,
    /// 不应答的 GET_INFO 选择器
    pub silent_selectors: Vec<u32>,
}

#[derive(Clone)]
pub struct FakeChip {
    pub state: Arc<Mutex<ChipState>>,
}

impl FakeChip {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ChipState {
                chip_type: CHIP_TYPE_EXPECTED,
                chip_version: CHIP_VERSION,
                ..Default::default()
            })),
        }
    }

    pub fn with_chip_type(chip_type: u32) -> Self {
        let chip = Self::new();
        chip.state.lock().chip_type = chip_type;
        chip
    }

    /// 处理一个请求帧，返回应答帧
    pub fn respond(&self, request: &[u8]) -> Option<Vec<u8>> {
        if request.len() != FRAME_SIZE || crc8(&request[..7]) != request[7] {
            return None;
        }
        let device_addr = request[1];
        let cmd = request[2];
        let data = u32::from_be_bytes([request[3], request[4], request[5], request[6]]);

        let mut chip = self.state.lock();
        let reply_addr = chip.reply_device_addr.unwrap_or(device_addr);

        if let Some((failing, status)) = chip.fail_command
            && failing == cmd
        {
            return Some(reply(reply_addr, status, 0xDEAD_BEEF));
        }

        let (status, value) = match cmd {
            c if c == Command::GetInfo as u8 => {
                if chip.silent_selectors.contains(&data) {
                    return None;
                }
                match data {
                    d if d == InfoSelector::ChipType as u32 => (Status::Ok, chip.chip_type),
                    d if d == InfoSelector::ChipVersion as u32 => (Status::Ok, chip.chip_version),
                    d if d == InfoSelector::BootloaderVersion as u32 => {
                        (Status::Ok, BOOTLOADER_VERSION)
                    },
                    _ => (Status::InvalidValue, 0),
                }
            },
            c if c == Command::SetBank as u8 => match data {
                0 | 1 | 2 | 3 | 5 => {
                    chip.bank = data as u8;
                    (Status::Ok, 0)
                },
                _ => (Status::InvalidBank, 0),
            },
            c if c == Command::SetAddress as u8 => {
                chip.addr = data;
                (Status::Ok, 0)
            },
            c if c == Command::Read32 as u8 => {
                let key = (chip.bank, chip.addr);
                (Status::Ok, chip.memory.get(&key).copied().unwrap_or(0))
            },
            c if c == Command::Write32 as u8 => {
                let key = (chip.bank, chip.addr);
                chip.memory.insert(key, data);
                (Status::Ok, 0)
            },
            c if c == Command::NoOp as u8 => (Status::Ok, 0),
            _ => (Status::CommandNotFound, 0),
        };

        Some(reply(reply_addr, status, value))
    }

    /// 连接到该芯片的 mock 通道
    pub fn channel(&self) -> MockChannel {
        let chip = self.clone();
        MockChannel::new(move |req| chip.respond(req))
    }
}

pub fn reply(device_addr: u8, status: Status, data: u32) -> Vec<u8> {
    Reply {
        host_addr: DEFAULT_HOST_ADDR,
        device_addr,
        status,
        data,
    }
    .encode()
    .to_vec()
}

pub fn fast_config() -> TransportConfig {
    TransportConfig {
        reply_timeout: Duration::from_millis(5),
        startup_delay: Duration::ZERO,
        ..Default::default()
    }
}

/// 已打开通道、未初始化的传输实例，以及其发送记录
pub fn open_transport(chip: &FakeChip) -> (MotorTransport<MockChannel>, Transcript) {
    let mut channel = chip.channel();
    channel.open().unwrap();
    let transcript = channel.transcript();
    (MotorTransport::new("motor1", channel, fast_config()), transcript)
}
