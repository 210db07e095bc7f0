use num_enum::TryFromPrimitiveError;
use thiserror::Error;

use crate::frame::CommandCode;

/// Faults raised by a [`Bus`](crate::bus::Bus) implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("No acknowledgement from device at address {address:#04x}")]
    Nack { address: u8 },

    #[error("Short read from {address:#04x}: expected {expected} bytes, got {actual}")]
    ShortRead { address: u8, expected: usize, actual: usize },

    #[error("Bus I/O error: {0}")]
    Io(String),
}

/// The primary error type for the `pecmac-lib` library.
#[derive(Error, Debug)]
pub enum PecmacError {
    #[error("Device not found at address {address:#04x} (present: {available:02x?})")]
    DeviceNotFound { address: u8, available: Vec<u8> },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Invalid channel range {start}..={end}: {reason}")]
    InvalidRange { start: u8, end: u8, reason: &'static str },

    #[error("Malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },

    #[error("Checksum mismatch: expected {expected:#04x}, received {received:#04x}")]
    ChecksumMismatch { expected: u8, received: u8 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Unknown command code {0:#04x}")]
    UnknownCommand(u8),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Configuration parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<TryFromPrimitiveError<CommandCode>> for PecmacError {
    fn from(err: TryFromPrimitiveError<CommandCode>) -> Self {
        PecmacError::UnknownCommand(err.number)
    }
}
