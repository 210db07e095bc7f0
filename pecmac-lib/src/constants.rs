// Protocol constants for PECMAC current monitors

/// Default 7-bit I2C address of the device
pub const DEFAULT_ADDRESS: u8 = 0x2A;

/// Default number of current-sensing channels
pub const DEFAULT_CHANNELS: u8 = 6;

/// First header byte of every command frame
pub const HEADER_BYTE_1: u8 = 0x92;

/// Second header byte of every command frame
pub const HEADER_BYTE_2: u8 = 0x6A;

/// Filler for the reserved command frame fields
pub const RESERVED: u8 = 0x00;

/// Size of a command frame (header, command, two params, two reserved, checksum)
pub const COMMAND_FRAME_SIZE: usize = 8;

/// Size of the identity response (type, max current, channels, 4 reserved)
pub const IDENTITY_RESPONSE_SIZE: usize = 7;

/// Bytes per channel in a current response (24-bit big endian)
pub const CURRENT_BYTES_PER_CHANNEL: usize = 3;

/// Bytes per channel in a calibration response (16-bit big endian)
pub const CALIBRATION_BYTES_PER_CHANNEL: usize = 2;

/// Size of the trailing checksum on current/calibration responses
pub const CHECKSUM_SIZE: usize = 1;

/// Largest channel count fetched in one transfer; 5 channels keeps a
/// current response at 16 bytes
pub const MAX_CHANNELS_PER_TRANSFER: u8 = 5;

/// Settle time between writing a command and reading its response, in milliseconds
pub const SETTLE_DELAY_MS: u64 = 500;

/// First and last valid 7-bit addresses probed by a bus scan
pub const SCAN_FIRST_ADDRESS: u8 = 0x08;
pub const SCAN_LAST_ADDRESS: u8 = 0x77;
