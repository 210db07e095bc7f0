//! Common test utilities and shared imports

// Shared across test files; not every item is used in each one
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use pecmac_lib::frame::{CommandCode, CommandFrame, build_command, checksum};
#[allow(unused_imports)]
pub use pecmac_lib::sim::{BusEvent, ScriptedBus, SimulatedPecmac};
#[allow(unused_imports)]
pub use pecmac_lib::{
    BusError, Channel, CurrentScaling, CurrentUnit, DriverConfig, Integrity, Pecmac, PecmacError, ReadingMap, SETTLE_DELAY,
};

/// Decode hex string to bytes for testing
#[allow(dead_code)]
pub fn hex_to_bytes(hex_data: &str) -> Vec<u8> {
    hex::decode(hex_data).expect("Failed to decode hex")
}

/// Appends the modulo-256 checksum to `data`
#[allow(dead_code)]
pub fn sealed(data: &[u8]) -> Vec<u8> {
    let mut frame = data.to_vec();
    frame.push(checksum(data));
    frame
}

/// Current response for the given milliamp counts
#[allow(dead_code)]
pub fn current_response(milliamps: &[u32]) -> Vec<u8> {
    let data: Vec<u8> = milliamps.iter().flat_map(|ma| ma.to_be_bytes()[1..].to_vec()).collect();
    sealed(&data)
}

/// Calibration response for the given constants
#[allow(dead_code)]
pub fn calibration_response(constants: &[u16]) -> Vec<u8> {
    let data: Vec<u8> = constants.iter().flat_map(|c| c.to_be_bytes()).collect();
    sealed(&data)
}

/// Builds a reading map from `(channel, value)` pairs
#[allow(dead_code)]
pub fn readings(pairs: &[(u8, f64)]) -> ReadingMap {
    pairs.iter().map(|&(ch, v)| (Channel::new(ch), v)).collect()
}

/// Driver over a scripted bus with default settings
#[allow(dead_code)]
pub fn scripted_driver(bus: ScriptedBus) -> Pecmac<ScriptedBus> {
    Pecmac::new(bus, DriverConfig::default()).expect("default config is valid")
}

/// Identity response of a 6-channel, 70 A device
#[allow(dead_code)]
pub const IDENTITY_RESPONSE: &str = "01460600000000";
