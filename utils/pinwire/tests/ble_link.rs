//! BLE driver against the virtual bench: loop-back, queued replies, and the
//! factory reset command sequence.

use pinwire::config::BleConfig;
use pinwire::{
    BleModule, BlockingPolicy, Command, Direction, Error, SampleBuffer, VirtualBench,
    encode_frames,
};

fn quick_config() -> BleConfig {
    BleConfig {
        reset_hold_ms: 0,
        mode_switch_delay_ms: 0,
        command_delay_ms: 0,
        ..BleConfig::default()
    }
}

/// What the logic analyser would record for `text` sent by the module.
fn capture_of(config: &BleConfig, text: &str) -> SampleBuffer {
    let per_bit = config.record_multiplier as usize;
    let mut samples: SampleBuffer = encode_frames(text)
        .iter()
        .flat_map(|bit| std::iter::repeat_n(if bit { 1.0 } else { 0.0 }, per_bit))
        .collect();
    samples.resize(config.buffer_size, 1.0);
    samples
}

#[test]
fn loop_back_returns_written_text() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.loop_back(config.pins.rx, config.pins.tx);
    let mut ble = BleModule::new(config);

    ble.write_data(&mut bench, "hi").unwrap();
    let received = ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert_eq!(received.data, "hi");
    assert!(received.system.is_empty());
}

#[test]
fn transmit_idles_high_at_configured_baud() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    let mut ble = BleModule::new(config.clone());

    ble.write_data(&mut bench, 0x55u8).unwrap();
    let generated = &bench.generated()[0];
    assert_eq!(generated.pin, config.pins.rx);
    assert_eq!(generated.baud_rate, 115_200);
    assert_eq!(generated.bits.to_string(), "0101010101");
    assert_eq!(bench.level(config.pins.rx), Some(true));
}

#[test]
fn non_blocking_read_without_reply_is_empty() {
    let mut bench = VirtualBench::new();
    let mut ble = BleModule::new(quick_config());
    let received = ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert!(received.is_empty());
}

#[test]
fn blocking_read_skips_idle_captures() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.queue_capture(config.pins.tx, vec![1.0; config.buffer_size]);
    bench.queue_capture(config.pins.tx, capture_of(&config, "ok"));
    let mut ble = BleModule::new(config);

    let received = ble.read(&mut bench, BlockingPolicy::Blocking).unwrap();
    assert_eq!(received.data, "ok");
}

#[test]
fn blocking_read_propagates_timeout() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.queue_capture(config.pins.tx, vec![1.0; config.buffer_size]);
    let mut ble = BleModule::new(config);

    assert!(matches!(
        ble.read(&mut bench, BlockingPolicy::Blocking),
        Err(Error::CaptureTimeout)
    ));
}

#[test]
fn status_message_split_across_captures() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.queue_capture(config.pins.tx, capture_of(&config, "ab%CON"));
    bench.queue_capture(config.pins.tx, capture_of(&config, "NECT%x"));
    let mut ble = BleModule::new(config);

    let first = ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert_eq!(first.data, "ab");
    assert!(first.system.is_empty());
    assert!(ble.framer().in_message());

    let second = ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert_eq!(second.data, "x");
    assert_eq!(second.system, "CONNECT");
}

#[test]
fn close_forgets_pending_status_message() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.queue_capture(config.pins.tx, capture_of(&config, "%CONN"));
    bench.queue_capture(config.pins.tx, capture_of(&config, "data"));
    let mut ble = BleModule::new(config.clone());

    ble.open(&mut bench).unwrap();
    ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert!(ble.framer().in_message());

    ble.close(&mut bench).unwrap();
    assert!(!ble.framer().in_message());
    assert_eq!(bench.level(config.pins.rst), Some(true));

    let received = ble.read(&mut bench, BlockingPolicy::NonBlocking).unwrap();
    assert_eq!(received.data, "data");
}

#[test]
fn open_configures_control_lines() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    let mut ble = BleModule::new(config.clone());

    ble.open(&mut bench).unwrap();
    assert_eq!(bench.direction(config.pins.rst), Some(Direction::Output));
    assert_eq!(bench.direction(config.pins.status), Some(Direction::Input));
    assert_eq!(bench.level(config.pins.rst), Some(true));
}

#[test]
fn connection_follows_status_line() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    let mut ble = BleModule::new(config.clone());

    bench.set_input(config.pins.status, true);
    assert!(!ble.is_connected(&mut bench).unwrap());
    bench.set_input(config.pins.status, false);
    assert!(ble.is_connected(&mut bench).unwrap());
}

#[test]
fn command_reply_decides_acceptance() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    bench.queue_capture(config.pins.tx, capture_of(&config, "AOK"));
    bench.queue_capture(config.pins.tx, capture_of(&config, "Err"));
    let mut ble = BleModule::new(config);

    assert!(ble.write_command(&mut bench, Command::HighPower).unwrap());
    assert!(!ble.write_command(&mut bench, Command::PinCode).unwrap());
    // silence counts as accepted
    assert!(ble.write_command(&mut bench, Command::Reboot).unwrap());
    assert_eq!(bench.generated().len(), 3);
}

#[test]
fn factory_reset_retries_refused_command() {
    let config = quick_config();
    let mut bench = VirtualBench::new();
    let tx = config.pins.tx;
    bench.queue_capture(tx, capture_of(&config, "CMD>"));
    bench.queue_capture(tx, capture_of(&config, "ERR"));
    bench.queue_capture(tx, capture_of(&config, "ERR"));
    bench.queue_capture(tx, capture_of(&config, "AOK"));
    let mut ble = BleModule::new(config);

    ble.factory_reset(&mut bench).unwrap();

    let sent: Vec<String> = bench
        .generated()
        .iter()
        .map(|waveform| waveform.bits.to_string())
        .collect();
    let expected: Vec<String> = [
        Command::CommandMode,
        Command::FactoryReset,
        Command::FactoryReset,
        Command::FactoryReset,
        Command::CommandMode,
        Command::Rename,
        Command::HighPower,
        Command::TransparentMode,
        Command::DataMode,
    ]
    .iter()
    .map(|command| encode_frames(command.as_str()).to_string())
    .collect();
    assert_eq!(sent, expected);
}

#[test]
fn factory_reset_gives_up_after_max_attempts() {
    let config = BleConfig {
        max_command_attempts: 2,
        ..quick_config()
    };
    let mut bench = VirtualBench::new();
    let tx = config.pins.tx;
    bench.queue_capture(tx, capture_of(&config, "CMD>"));
    for _ in 0..3 {
        bench.queue_capture(tx, capture_of(&config, "ERR"));
    }
    let mut ble = BleModule::new(config);

    assert!(matches!(
        ble.factory_reset(&mut bench),
        Err(Error::CommandRejected(_))
    ));
    // command mode plus two refused resets
    assert_eq!(bench.generated().len(), 3);
}

#[test]
fn rejects_zero_baud_transmit() {
    let config = BleConfig {
        baud_rate: 0,
        ..quick_config()
    };
    let mut bench = VirtualBench::new();
    let mut ble = BleModule::new(config);
    assert!(matches!(
        ble.write_data(&mut bench, "x"),
        Err(Error::Instrument(_))
    ));
}
