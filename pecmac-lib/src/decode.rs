//! Decoding of identity, current and calibration responses.

use serde::Serialize;
use std::fmt;
use zerocopy::byteorder::big_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{CurrentScaling, CurrentUnit};
use crate::constants::{CALIBRATION_BYTES_PER_CHANNEL, CHECKSUM_SIZE, CURRENT_BYTES_PER_CHANNEL, IDENTITY_RESPONSE_SIZE};
use crate::error::PecmacError;
use crate::frame::verify_checksum;
use crate::reading::{ChannelRange, ReadingMap, Verified};

/// Identity response layout (7 bytes)
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct IdentityRaw {
    pub sensor_type: u8,
    pub max_current: u8,
    pub channel_count: u8,
    pub reserved: [u8; 4],
}

/// One channel of a current response: a 24-bit big-endian milliamp count
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct CurrentRaw {
    pub msb_high: u8,
    pub msb: u8,
    pub lsb: u8,
}

impl CurrentRaw {
    /// Packs the low 24 bits of `count`.
    pub fn from_count(count: u32) -> Self {
        let [_, msb_high, msb, lsb] = count.to_be_bytes();
        Self { msb_high, msb, lsb }
    }

    pub fn count(&self) -> u32 {
        u32::from_be_bytes([0, self.msb_high, self.msb, self.lsb])
    }

    pub fn scaled(&self, divisor: f64, scaling: CurrentScaling) -> f64 {
        scaling.apply(self.msb_high, self.msb, self.lsb, divisor)
    }
}

/// What the device reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub sensor_type: u8,
    /// Maximum rated current, in device units
    pub max_current: u8,
    pub channel_count: u8,
}

impl From<IdentityRaw> for DeviceIdentity {
    fn from(raw: IdentityRaw) -> Self {
        Self {
            sensor_type: raw.sensor_type,
            max_current: raw.max_current,
            channel_count: raw.channel_count,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor type: {}, Max current: {}, Channels: {}",
            self.sensor_type, self.max_current, self.channel_count
        )
    }
}

/// Expected length of a current response for `range`
pub fn current_response_len(range: ChannelRange) -> usize {
    range.channel_count() * CURRENT_BYTES_PER_CHANNEL + CHECKSUM_SIZE
}

/// Expected length of a calibration response for `range`
pub fn calibration_response_len(range: ChannelRange) -> usize {
    range.channel_count() * CALIBRATION_BYTES_PER_CHANNEL + CHECKSUM_SIZE
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), PecmacError> {
    if bytes.len() != expected {
        return Err(PecmacError::MalformedResponse {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

/// Decodes the 7-byte identity response. The reserved tail is ignored and no
/// checksum is checked.
pub fn decode_identity(bytes: &[u8]) -> Result<DeviceIdentity, PecmacError> {
    check_len(bytes, IDENTITY_RESPONSE_SIZE)?;
    let raw = IdentityRaw::read_from_bytes(bytes).map_err(|_| PecmacError::MalformedResponse {
        expected: IDENTITY_RESPONSE_SIZE,
        actual: bytes.len(),
    })?;
    Ok(DeviceIdentity::from(raw))
}

/// Decodes a current response covering `range` into readings in `unit`,
/// dividing only the low byte of each sample.
pub fn decode_current(bytes: &[u8], range: ChannelRange, unit: CurrentUnit) -> Result<Verified<ReadingMap>, PecmacError> {
    decode_current_scaled(bytes, range, unit, CurrentScaling::LowByte)
}

/// [`decode_current`] with an explicit [`CurrentScaling`].
pub fn decode_current_scaled(
    bytes: &[u8],
    range: ChannelRange,
    unit: CurrentUnit,
    scaling: CurrentScaling,
) -> Result<Verified<ReadingMap>, PecmacError> {
    let expected = current_response_len(range);
    check_len(bytes, expected)?;
    let integrity = verify_checksum(bytes);

    let data = &bytes[..expected - CHECKSUM_SIZE];
    let samples = <[CurrentRaw]>::ref_from_bytes(data)
        .map_err(|_| PecmacError::MalformedResponse { expected, actual: bytes.len() })?;

    let divisor = unit.divisor();
    let readings = range
        .channels()
        .zip(samples)
        .map(|(channel, raw)| (channel, raw.scaled(divisor, scaling)))
        .collect();

    Ok(Verified::new(readings, integrity))
}

/// Decodes a calibration response covering `range`. Calibration constants
/// are raw and never scaled.
pub fn decode_calibration(bytes: &[u8], range: ChannelRange) -> Result<Verified<ReadingMap>, PecmacError> {
    let expected = calibration_response_len(range);
    check_len(bytes, expected)?;
    let integrity = verify_checksum(bytes);

    let data = &bytes[..expected - CHECKSUM_SIZE];
    let constants = <[U16]>::ref_from_bytes(data)
        .map_err(|_| PecmacError::MalformedResponse { expected, actual: bytes.len() })?;

    let readings = range
        .channels()
        .zip(constants)
        .map(|(channel, raw)| (channel, f64::from(raw.get())))
        .collect();

    Ok(Verified::new(readings, integrity))
}
