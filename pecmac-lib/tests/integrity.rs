//! Tests for checksum handling, strict mode and the injected log sink

mod common;

use common::*;
use pecmac_lib::LogLevel;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::Dispatch;

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

fn log_sink(level: LogLevel, logs: &CapturedLogs) -> Dispatch {
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level.level_filter())
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    Dispatch::new(subscriber)
}

#[test]
fn test_corrupt_checksum_returns_suspect_values() {
    let sim = SimulatedPecmac::new(6)
        .with_currents(&[1_000, 2_000])
        .with_corrupt_checksums(true);
    let mut device = Pecmac::new(sim, DriverConfig::default()).unwrap();

    let readings = device.read_current(1, 2).unwrap();
    assert_eq!(readings.value, common::readings(&[(1, 1_000.0), (2, 2_000.0)]));
    assert!(!readings.is_verified());
    assert!(matches!(
        readings.into_checked(),
        Err(PecmacError::ChecksumMismatch { .. })
    ));
}

#[test]
fn test_strict_mode_rejects_corrupt_checksum() {
    let sim = SimulatedPecmac::new(6).with_corrupt_checksums(true);
    let config = DriverConfig::default().with_strict_checksum(true);
    let mut device = Pecmac::new(sim, config).unwrap();

    assert!(matches!(
        device.read_calibration(1, 6),
        Err(PecmacError::ChecksumMismatch { .. })
    ));
    assert_eq!(device.bus().commands().len(), 1, "strict mode stops at the first bad chunk");
}

#[test]
fn test_strict_mode_passes_clean_data() {
    let sim = SimulatedPecmac::new(6).with_currents(&[5, 6, 7, 8, 9, 10]);
    let config = DriverConfig::default().with_strict_checksum(true);
    let mut device = Pecmac::new(sim, config).unwrap();

    let readings = device.read_all_currents().unwrap();
    assert!(readings.is_verified());
    assert_eq!(readings.into_checked().unwrap().len(), 6);
}

#[test]
fn test_one_bad_chunk_marks_merged_result_suspect() {
    let mut bad = current_response(&[6]);
    let good_sum = bad[3];
    bad[3] = good_sum.wrapping_add(7);

    let bus = ScriptedBus::new()
        .respond(current_response(&[1, 2, 3, 4, 5]))
        .respond(bad);
    let mut device = scripted_driver(bus);

    let readings = device.read_current(1, 6).unwrap();
    assert_eq!(readings.value.len(), 6);
    assert_eq!(readings.value[&Channel::new(6)], 6.0);
    assert_eq!(
        readings.integrity,
        Integrity::Suspect {
            expected: good_sum,
            received: good_sum.wrapping_add(7)
        }
    );
}

#[test]
fn test_checksum_warning_goes_to_injected_sink() {
    let logs = CapturedLogs::default();
    let sim = SimulatedPecmac::new(6).with_corrupt_checksums(true);
    let mut device = Pecmac::new(sim, DriverConfig::default())
        .unwrap()
        .with_log_sink(log_sink(LogLevel::Debug, &logs));

    device.read_current(1, 1).unwrap();

    let output = logs.contents();
    assert!(output.contains("Mismatched checksum"), "log output: {output}");
    assert!(output.contains("I2C Write"), "debug frames should be logged: {output}");
}

#[test]
fn test_error_level_hides_debug_frames() {
    let logs = CapturedLogs::default();
    let sim = SimulatedPecmac::new(6);
    let mut device = Pecmac::new(sim, DriverConfig::default())
        .unwrap()
        .with_log_sink(log_sink(LogLevel::Error, &logs));

    device.read_current(1, 3).unwrap();
    assert!(!logs.contents().contains("I2C Write"));

    let missing = SimulatedPecmac::new(6).with_address(0x30);
    let mut device = Pecmac::new(missing, DriverConfig::default())
        .unwrap()
        .with_log_sink(log_sink(LogLevel::Error, &logs));
    assert!(device.identity().is_err());
    assert!(logs.contents().contains("ERROR"));
}

#[test]
fn test_none_level_is_silent() {
    let logs = CapturedLogs::default();
    let sim = SimulatedPecmac::new(6).with_corrupt_checksums(true);
    let mut device = Pecmac::new(sim, DriverConfig::default())
        .unwrap()
        .with_log_sink(log_sink(LogLevel::None, &logs));

    device.read_current(1, 6).unwrap();
    assert!(logs.contents().is_empty());
}
