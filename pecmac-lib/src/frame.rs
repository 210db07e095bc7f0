//! Command frames and the modulo-256 checksum shared by both directions.
//!
//! Every command is eight bytes:
//!
//! ```text
//! [0x92, 0x6A, command, param_a, param_b, 0x00, 0x00, checksum]
//! ```
//!
//! `param_a`/`param_b` carry the start/end channel for current and
//! calibration reads and are zero for the identity query. The checksum is the
//! wrapping sum of the seven preceding bytes. Responses end with the same kind
//! of checksum over their data bytes (identity responses excepted).

use bytes::{BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;
use strum_macros::Display;
use tracing::warn;

use crate::constants::{COMMAND_FRAME_SIZE, HEADER_BYTE_1, HEADER_BYTE_2, RESERVED};
use crate::error::PecmacError;
use crate::reading::Integrity;

/// Command codes understood by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CommandCode {
    #[strum(to_string = "read current")]
    ReadCurrent = 0x01,
    #[strum(to_string = "read identity")]
    ReadIdentity = 0x02,
    #[strum(to_string = "read calibration")]
    ReadCalibration = 0x03,
    /// Writes calibration constants. Never issued by this driver.
    #[strum(to_string = "calibrate")]
    Calibrate = 0x04,
}

/// A complete, checksummed command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame([u8; COMMAND_FRAME_SIZE]);

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn command_byte(&self) -> u8 {
        self.0[2]
    }

    pub fn command(&self) -> Result<CommandCode, PecmacError> {
        Ok(CommandCode::try_from(self.command_byte())?)
    }

    pub fn param_a(&self) -> u8 {
        self.0[3]
    }

    pub fn param_b(&self) -> u8 {
        self.0[4]
    }

    pub fn checksum(&self) -> u8 {
        self.0[COMMAND_FRAME_SIZE - 1]
    }

    /// Parses bytes written by a host, rejecting anything `build_command`
    /// would not have produced.
    pub fn parse(bytes: &[u8]) -> Result<Self, PecmacError> {
        let frame: [u8; COMMAND_FRAME_SIZE] = bytes.try_into().map_err(|_| {
            PecmacError::InvalidFrame(format!(
                "command frame must be {} bytes, got {}",
                COMMAND_FRAME_SIZE,
                bytes.len()
            ))
        })?;

        if frame[0] != HEADER_BYTE_1 || frame[1] != HEADER_BYTE_2 {
            return Err(PecmacError::InvalidFrame(format!(
                "bad header {:02x} {:02x}",
                frame[0], frame[1]
            )));
        }

        let frame = Self(frame);
        let expected = checksum(&frame.0[..COMMAND_FRAME_SIZE - 1]);
        if expected != frame.checksum() {
            return Err(PecmacError::ChecksumMismatch {
                expected,
                received: frame.checksum(),
            });
        }
        frame.command()?;
        Ok(frame)
    }
}

impl AsRef<[u8]> for CommandFrame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Builds the frame for `command` with its two parameter bytes.
pub fn build_command(command: CommandCode, param_a: u8, param_b: u8) -> CommandFrame {
    let mut buf = BytesMut::with_capacity(COMMAND_FRAME_SIZE);
    buf.put_u8(HEADER_BYTE_1);
    buf.put_u8(HEADER_BYTE_2);
    buf.put_u8(command.into());
    buf.put_u8(param_a);
    buf.put_u8(param_b);
    buf.put_u8(RESERVED);
    buf.put_u8(RESERVED);
    buf.put_u8(checksum(&buf));

    let mut frame = [0u8; COMMAND_FRAME_SIZE];
    frame.copy_from_slice(&buf);
    CommandFrame(frame)
}

/// Sum of `bytes` modulo 256.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checks the trailing checksum byte of a response frame.
///
/// A mismatch is logged and reported as [`Integrity::Suspect`]; the frame is
/// never modified and this never fails. An empty frame has no checksum and is
/// reported as suspect with both values zero.
pub fn verify_checksum(frame: &[u8]) -> Integrity {
    let Some((&received, data)) = frame.split_last() else {
        warn!("Empty frame carries no checksum");
        return Integrity::Suspect {
            expected: 0,
            received: 0,
        };
    };

    let expected = checksum(data);
    if expected == received {
        Integrity::Verified
    } else {
        warn!(expected, received, frame = %hex::encode(frame), "Mismatched checksum");
        Integrity::Suspect { expected, received }
    }
}
