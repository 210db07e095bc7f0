//! Tests for the write → settle → read cycle and transport faults

mod common;

use common::*;
use std::time::Duration;

#[test]
fn test_settle_delay_is_half_a_second() {
    assert_eq!(SETTLE_DELAY, Duration::from_millis(500));
}

#[test]
fn test_identity_round_trip() {
    let bus = ScriptedBus::new().respond(hex_to_bytes(IDENTITY_RESPONSE));
    let mut device = scripted_driver(bus);

    let identity = device.identity().unwrap();
    assert_eq!(identity.sensor_type, 1);
    assert_eq!(identity.max_current, 70);
    assert_eq!(identity.channel_count, 6);

    let bus = device.release();
    assert_eq!(
        bus.events(),
        &[
            BusEvent::Write {
                address: 0x2A,
                bytes: vec![0x92, 0x6A, 0x02, 0x00, 0x00, 0x00, 0x00, 0xFE],
            },
            BusEvent::Delay(SETTLE_DELAY),
            BusEvent::Read { address: 0x2A, len: 7 },
        ]
    );
}

#[test]
fn test_identity_is_requeried_every_call() {
    let bus = ScriptedBus::new()
        .respond(hex_to_bytes(IDENTITY_RESPONSE))
        .respond(hex_to_bytes("02140c00000000"));
    let mut device = scripted_driver(bus);

    assert_eq!(device.identity().unwrap().channel_count, 6);
    assert_eq!(device.identity().unwrap().channel_count, 12);
    assert_eq!(device.bus().writes().len(), 2);
    assert_eq!(device.bus().delays(), vec![SETTLE_DELAY, SETTLE_DELAY]);
}

#[test]
fn test_identity_from_simulated_device() {
    let sim = SimulatedPecmac::new(12).with_identity(4, 125);
    let mut device = Pecmac::new(sim, DriverConfig::default().with_channels(12)).unwrap();

    let identity = device.identity().unwrap();
    assert_eq!(identity.sensor_type, 4);
    assert_eq!(identity.max_current, 125);
    assert_eq!(identity.channel_count, 12);
    assert_eq!(identity.to_string(), "Sensor type: 4, Max current: 125, Channels: 12");
    assert_eq!(device.bus().elapsed(), SETTLE_DELAY);
}

#[test]
fn test_repeated_query_sees_new_device_state() {
    let sim = SimulatedPecmac::new(6).with_currents(&[100, 200, 300]);
    let mut device = Pecmac::new(sim, DriverConfig::default()).unwrap();

    let before = device.read_current(1, 3).unwrap();
    assert_eq!(before.value, common::readings(&[(1, 100.0), (2, 200.0), (3, 300.0)]));

    let mut sim = device.release();
    sim.set_current(2, 4_321);
    sim.set_current(9, 1);
    let mut device = Pecmac::new(sim, DriverConfig::default()).unwrap();

    let after = device.read_current(1, 3).unwrap();
    assert_eq!(after.value, common::readings(&[(1, 100.0), (2, 4_321.0), (3, 300.0)]));
    assert_eq!(device.bus().commands().len(), 2);
}

#[test]
fn test_current_read_uses_configured_address() {
    let bus = ScriptedBus::new().respond(current_response(&[250]));
    let config = DriverConfig::default().with_address(0x2B);
    let mut device = Pecmac::new(bus, config).unwrap();

    let readings = device.read_current(2, 2).unwrap();
    assert_eq!(readings.value, common::readings(&[(2, 250.0)]));

    let bus = device.release();
    assert_eq!(
        bus.events()[0],
        BusEvent::Write {
            address: 0x2B,
            bytes: build_command(CommandCode::ReadCurrent, 2, 2).as_bytes().to_vec(),
        }
    );
    assert_eq!(bus.events()[2], BusEvent::Read { address: 0x2B, len: 4 });
}

#[test]
fn test_write_fault_is_returned_without_reading() {
    let bus = ScriptedBus::new()
        .fail_write(BusError::Nack { address: 0x2A })
        .respond(current_response(&[1, 2]));
    let mut device = scripted_driver(bus);

    let result = device.read_current(1, 2);
    assert!(matches!(
        result,
        Err(PecmacError::Bus(BusError::Nack { address: 0x2A }))
    ));

    let bus = device.release();
    assert_eq!(bus.events().len(), 1, "no delay or read after a failed write");
    assert!(bus.delays().is_empty());
    assert_eq!(bus.remaining_responses(), 1);
}

#[test]
fn test_read_fault_is_not_retried() {
    let bus = ScriptedBus::new()
        .fail_read(BusError::Io("arbitration lost".to_string()))
        .respond(current_response(&[1, 2]));
    let mut device = scripted_driver(bus);

    match device.read_current(1, 2) {
        Err(PecmacError::Bus(BusError::Io(msg))) => assert_eq!(msg, "arbitration lost"),
        other => panic!("Expected bus I/O error, got {:?}", other),
    }
    assert_eq!(device.bus().writes().len(), 1);
    assert_eq!(device.bus().remaining_responses(), 1);
}

#[test]
fn test_short_read_is_a_transport_fault() {
    let bus = ScriptedBus::new().respond(vec![0x00, 0x03, 0xE8, 0xEB]);
    let mut device = scripted_driver(bus);

    let result = device.read_current(1, 2);
    assert!(matches!(
        result,
        Err(PecmacError::Bus(BusError::ShortRead {
            address: 0x2A,
            expected: 7,
            actual: 4
        }))
    ));
}

#[test]
fn test_overlong_read_is_malformed_not_short() {
    let bus = ScriptedBus::new().respond(current_response(&[1_000, 2_000, 3_000]));
    let mut device = scripted_driver(bus);

    let result = device.read_current(1, 2);
    assert!(matches!(
        result,
        Err(PecmacError::MalformedResponse { expected: 7, actual: 10 })
    ));
}

#[test]
fn test_fault_in_later_chunk_fails_whole_query() {
    let bus = ScriptedBus::new()
        .respond(current_response(&[1, 2, 3, 4, 5]))
        .fail_read(BusError::Nack { address: 0x2A });
    let mut device = scripted_driver(bus);

    let result = device.read_current(1, 6);
    assert!(matches!(result, Err(PecmacError::Bus(BusError::Nack { .. }))));
    assert_eq!(device.bus().writes().len(), 2);
}

#[test]
fn test_probe_finds_configured_address() {
    let bus = ScriptedBus::new().with_device(0x10).with_device(0x2A);
    let mut device = scripted_driver(bus);
    assert!(device.probe().is_ok());
    assert_eq!(device.bus().events(), &[BusEvent::Scan]);
}

#[test]
fn test_probe_reports_available_addresses() {
    let bus = ScriptedBus::new().with_device(0x10).with_device(0x40);
    let mut device = scripted_driver(bus);

    match device.probe() {
        Err(PecmacError::DeviceNotFound { address, available }) => {
            assert_eq!(address, 0x2A);
            assert_eq!(available, vec![0x10, 0x40]);
        }
        other => panic!("Expected DeviceNotFound, got {:?}", other),
    }
}

#[test]
fn test_simulated_device_rejects_other_addresses() {
    let bus = SimulatedPecmac::new(6).with_address(0x2C);
    let mut device = Pecmac::new(bus, DriverConfig::default()).unwrap();

    assert!(matches!(
        device.identity(),
        Err(PecmacError::Bus(BusError::Nack { address: 0x2A }))
    ));
    assert!(matches!(device.probe(), Err(PecmacError::DeviceNotFound { .. })));
}
