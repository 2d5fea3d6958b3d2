//! TMC9660 传输层集成测试（模拟芯片）

mod common;

use common::*;
use segment_driver::{MotorTransport, MotorTransportRegistry, TransportError};
use segment_protocol::tmc9660::{Bank, CONFIG_BASE_ADDR, Command, InfoSelector, Status};
use segment_serial::{MockChannel, SerialChannel};

#[test]
fn test_read_config_caches_bank() {
    let chip = FakeChip::new();
    chip.state.lock().memory.insert((5, CONFIG_BASE_ADDR + 4), 0x1234_5678);
    let (motor, transcript) = open_transport(&chip);

    // SET_BANK + SET_ADDRESS + READ_32
    assert_eq!(motor.read_config(4).unwrap(), 0x1234_5678);
    assert_eq!(transcript.len(), 3);

    // bank 已缓存：SET_ADDRESS + READ_32
    transcript.clear();
    assert_eq!(motor.read_config(4).unwrap(), 0x1234_5678);
    assert_eq!(transcript.len(), 2);
    let sent = transcript.sent();
    assert_eq!(sent[0][2], Command::SetAddress as u8);
    assert_eq!(sent[1][2], Command::Read32 as u8);
}

#[test]
fn test_set_bank_twice_sends_once() {
    let chip = FakeChip::new();
    let (motor, transcript) = open_transport(&chip);

    motor.set_bank(Bank::Spi).unwrap();
    motor.set_bank(Bank::Spi).unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(motor.get_state().current_bank, Bank::Spi as u8);

    motor.set_bank(Bank::Otp).unwrap();
    assert_eq!(transcript.len(), 2);
}

#[test]
fn test_set_address_always_sends() {
    let chip = FakeChip::new();
    let (motor, transcript) = open_transport(&chip);

    motor.set_address(0x100).unwrap();
    motor.set_address(0x100).unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(motor.get_state().current_addr, 0x100);
}

#[test]
fn test_misaligned_config_offset_sends_nothing() {
    let chip = FakeChip::new();
    let (motor, transcript) = open_transport(&chip);

    for offset in [1u8, 2, 3, 5, 63] {
        assert!(matches!(
            motor.read_config(offset),
            Err(TransportError::Alignment { .. })
        ));
    }
    assert!(matches!(
        motor.write_config(64, 1),
        Err(TransportError::Alignment { offset: 64 })
    ));
    assert!(transcript.is_empty());
}

#[test]
fn test_write_then_read_config() {
    let chip = FakeChip::new();
    let (motor, _transcript) = open_transport(&chip);

    motor.write_config(8, 0xA5A5_0001).unwrap();
    assert_eq!(motor.read_config(8).unwrap(), 0xA5A5_0001);
    assert_eq!(
        chip.state.lock().memory.get(&(5, CONFIG_BASE_ADDR + 8)),
        Some(&0xA5A5_0001)
    );
}

#[test]
fn test_device_status_error_surfaces_value() {
    let chip = FakeChip::new();
    chip.state.lock().fail_command = Some((Command::Read32 as u8, Status::Busy));
    let (motor, _transcript) = open_transport(&chip);

    let err = motor.read_32().unwrap_err();
    match err {
        TransportError::DeviceStatus { status, value } => {
            assert_eq!(status, Status::Busy);
            assert_eq!(value, 0xDEAD_BEEF);
        },
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_failed_set_bank_leaves_cache() {
    let chip = FakeChip::new();
    chip.state.lock().fail_command = Some((Command::SetBank as u8, Status::InvalidBank));
    let (motor, transcript) = open_transport(&chip);

    assert!(motor.read_config(0).is_err());
    // 组合操作在 SET_BANK 失败后中止
    assert_eq!(transcript.len(), 1);
    assert_eq!(motor.get_state().current_bank, 0xFF);
}

#[test]
fn test_timeout_when_device_silent() {
    let mut channel = MockChannel::silent();
    channel.open().unwrap();
    let motor = MotorTransport::new("motor1", channel, fast_config());

    assert!(matches!(
        motor.no_op(),
        Err(TransportError::Timeout { received: 0 })
    ));
}

#[test]
fn test_bad_reply_crc() {
    let mut channel = MockChannel::new(|req| {
        let mut frame = reply(req[1], Status::Ok, 0);
        frame[7] ^= 0xFF;
        Some(frame)
    });
    channel.open().unwrap();
    let motor = MotorTransport::new("motor1", channel, fast_config());

    assert!(matches!(
        motor.get_info(InfoSelector::ChipType),
        Err(TransportError::Checksum { .. })
    ));
}

#[test]
fn test_device_address_mismatch_is_not_fatal() {
    let chip = FakeChip::new();
    chip.state.lock().reply_device_addr = Some(0x07);
    let (motor, _transcript) = open_transport(&chip);

    assert!(motor.no_op().is_ok());
}

#[test]
fn test_init_reads_chip_identity() {
    let chip = FakeChip::new();
    let motor = MotorTransport::new("motor1", chip.channel(), fast_config());
    assert!(!motor.is_ready());

    motor.init().unwrap();
    assert!(motor.is_ready());
    let state = motor.get_state();
    assert_eq!(state.chip_type, 0x544D_0001);
    assert_eq!(state.chip_version, CHIP_VERSION);
    assert_eq!(state.bootloader_version, BOOTLOADER_VERSION);
}

#[test]
fn test_init_chip_type_mismatch() {
    let chip = FakeChip::with_chip_type(0x1234_0000);
    let motor = MotorTransport::new("motor1", chip.channel(), fast_config());

    assert!(matches!(
        motor.init(),
        Err(TransportError::DeviceMismatch {
            expected: 0x544D_0001,
            actual: 0x1234_0000,
        })
    ));
    assert!(!motor.is_ready());
}

#[test]
fn test_init_version_reads_are_best_effort() {
    let chip = FakeChip::new();
    chip.state.lock().silent_selectors = vec![
        InfoSelector::ChipVersion as u32,
        InfoSelector::BootloaderVersion as u32,
    ];
    let motor = MotorTransport::new("motor1", chip.channel(), fast_config());

    motor.init().unwrap();
    assert!(motor.is_ready());
    assert_eq!(motor.get_state().chip_version, 0);
}

#[test]
fn test_init_unexpected_chip_version_is_not_fatal() {
    let chip = FakeChip::new();
    chip.state.lock().chip_version = 7;
    let motor = MotorTransport::new("motor1", chip.channel(), fast_config());

    motor.init().unwrap();
    assert!(motor.is_ready());
    assert_eq!(motor.get_state().chip_version, 7);
}

#[test]
fn test_reinit_failure_clears_ready() {
    let chip = FakeChip::new();
    let motor = MotorTransport::new("motor1", chip.channel(), fast_config());
    motor.init().unwrap();
    assert!(motor.is_ready());

    chip.state.lock().silent_selectors = vec![InfoSelector::ChipType as u32];
    assert!(matches!(motor.init(), Err(TransportError::Timeout { .. })));
    assert!(!motor.is_ready());
    assert!(matches!(
        MotorTransportRegistry::new(vec![motor]).ready(0),
        Err(TransportError::NotInitialized)
    ));
}

#[test]
fn test_init_fails_when_chip_silent() {
    let motor = MotorTransport::new("motor1", MockChannel::silent(), fast_config());
    assert!(matches!(motor.init(), Err(TransportError::Timeout { .. })));
    assert!(!motor.is_ready());
}

#[test]
fn test_init_all_partial_success() {
    let good = FakeChip::new();
    let motors = vec![
        MotorTransport::new("motor1", good.channel(), fast_config()),
        MotorTransport::new("motor2", MockChannel::failing_open(), fast_config()),
        MotorTransport::new("motor3", FakeChip::new().channel(), fast_config()),
    ];
    let registry = MotorTransportRegistry::new(motors);

    let report = registry.init_all();
    assert!(!report.all_ok());
    assert_eq!(report.ready_count(), 2);
    let failed: Vec<_> = report.failures().map(|(name, _)| name.to_string()).collect();
    assert_eq!(failed, vec!["motor2".to_string()]);

    // 成功的实例仍然可用
    let motor1 = registry.ready(0).unwrap();
    motor1.write_config(0, 7).unwrap();
    assert_eq!(motor1.read_config(0).unwrap(), 7);
    assert!(matches!(registry.ready(1), Err(TransportError::NotInitialized)));
    assert!(registry.ready(2).is_ok());
}

#[test]
fn test_instances_do_not_share_cache() {
    let registry = MotorTransportRegistry::new(vec![
        MotorTransport::new("motor1", FakeChip::new().channel(), fast_config()),
        MotorTransport::new("motor2", FakeChip::new().channel(), fast_config()),
    ]);
    assert!(registry.init_all().all_ok());

    registry.get(0).unwrap().set_bank(Bank::Config).unwrap();
    assert_eq!(registry.get(0).unwrap().get_state().current_bank, 5);
    assert_eq!(registry.get(1).unwrap().get_state().current_bank, 0xFF);
}
