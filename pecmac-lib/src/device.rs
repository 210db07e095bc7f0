use bytes::Bytes;
use std::time::Duration;
use tracing::{Dispatch, debug, error, info, warn};

use crate::bus::Bus;
use crate::config::DriverConfig;
use crate::constants::{IDENTITY_RESPONSE_SIZE, MAX_CHANNELS_PER_TRANSFER, SETTLE_DELAY_MS};
use crate::decode::{
    DeviceIdentity, calibration_response_len, current_response_len, decode_calibration, decode_current_scaled,
    decode_identity,
};
use crate::error::{BusError, PecmacError};
use crate::frame::{CommandCode, CommandFrame, build_command};
use crate::reading::{ChannelRange, Integrity, ReadingMap, Verified};

/// Time the device needs between receiving a command and having its
/// response ready.
pub const SETTLE_DELAY: Duration = Duration::from_millis(SETTLE_DELAY_MS);

/// A PECMAC current monitor on a bus.
///
/// Every query is one or more write → settle → read cycles run to completion
/// in order. Operations take `&mut self`, so only one transaction is ever in
/// flight.
pub struct Pecmac<B> {
    bus: B,
    config: DriverConfig,
    log_sink: Option<Dispatch>,
}

impl<B: Bus> Pecmac<B> {
    pub fn new(bus: B, config: DriverConfig) -> Result<Self, PecmacError> {
        config.validate()?;
        Ok(Self {
            bus,
            config,
            log_sink: None,
        })
    }

    /// Routes all driver logging to `sink` instead of the default subscriber.
    pub fn with_log_sink(mut self, sink: Dispatch) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn release(self) -> B {
        self.bus
    }

    fn logged<T>(&mut self, op: impl FnOnce(&mut Self) -> T) -> T {
        match self.log_sink.clone() {
            Some(sink) => tracing::dispatcher::with_default(&sink, || op(self)),
            None => op(self),
        }
    }

    /// Checks that the configured address answers on the bus.
    pub fn probe(&mut self) -> Result<(), PecmacError> {
        self.logged(|this| {
            let address = this.config.address;
            let available = this.bus.scan().inspect_err(|e| error!("Bus scan failed: {e}"))?;
            if available.contains(&address) {
                info!("I2C Addr - {:#04x}", address);
                Ok(())
            } else {
                let listed: Vec<String> = available.iter().map(|a| format!("{a:#04x}")).collect();
                error!(
                    "Failed to find device at {:#04x}. Available addresses: [{}]",
                    address,
                    listed.join(", ")
                );
                Err(PecmacError::DeviceNotFound { address, available })
            }
        })
    }

    /// Queries sensor type, rated current and channel count.
    pub fn identity(&mut self) -> Result<DeviceIdentity, PecmacError> {
        self.logged(|this| {
            let frame = build_command(CommandCode::ReadIdentity, 0, 0);
            let response = this.transact(&frame, IDENTITY_RESPONSE_SIZE)?;
            let identity = decode_identity(&response)?;
            info!("{identity}");
            Ok(identity)
        })
    }

    /// Reads currents for channels `start..=end`, splitting the request so no
    /// transfer covers more than five channels.
    pub fn read_current(&mut self, start: u8, end: u8) -> Result<Verified<ReadingMap>, PecmacError> {
        let (unit, scaling) = (self.config.unit, self.config.scaling);
        self.logged(|this| {
            this.read_chunked(CommandCode::ReadCurrent, start, end, current_response_len, |bytes, range| {
                decode_current_scaled(bytes, range, unit, scaling)
            })
        })
    }

    /// Reads calibration constants for channels `start..=end`, chunked like
    /// [`read_current`](Self::read_current).
    pub fn read_calibration(&mut self, start: u8, end: u8) -> Result<Verified<ReadingMap>, PecmacError> {
        self.logged(|this| {
            this.read_chunked(
                CommandCode::ReadCalibration,
                start,
                end,
                calibration_response_len,
                decode_calibration,
            )
        })
    }

    pub fn read_all_currents(&mut self) -> Result<Verified<ReadingMap>, PecmacError> {
        self.read_current(1, self.config.channels)
    }

    pub fn read_all_calibration(&mut self) -> Result<Verified<ReadingMap>, PecmacError> {
        self.read_calibration(1, self.config.channels)
    }

    fn read_chunked(
        &mut self,
        command: CommandCode,
        start: u8,
        end: u8,
        response_len: fn(ChannelRange) -> usize,
        decode: impl Fn(&[u8], ChannelRange) -> Result<Verified<ReadingMap>, PecmacError>,
    ) -> Result<Verified<ReadingMap>, PecmacError> {
        let range = ChannelRange::new(start, end)?;
        range.check_within(self.config.channels)?;

        let chunks = range.split(MAX_CHANNELS_PER_TRANSFER);
        if chunks.len() > 1 {
            debug!("Splitting {} of {} into {} transfers", command, range, chunks.len());
        }

        let mut merged = Verified::empty();
        for chunk in chunks {
            let frame = build_command(command, chunk.start(), chunk.end());
            let response = self.transact(&frame, response_len(chunk))?;
            let decoded = decode(&response, chunk)?;

            if let Integrity::Suspect { expected, received } = decoded.integrity {
                if self.config.strict_checksum {
                    error!("Rejecting {} of {}: checksum mismatch", command, chunk);
                    return Err(PecmacError::ChecksumMismatch { expected, received });
                }
                warn!("Using unverified {} data for channels {}", command, chunk);
            }
            merged.merge(decoded);
        }
        Ok(merged)
    }

    /// One command/response cycle: write, settle, read exactly `response_len` bytes.
    fn transact(&mut self, frame: &CommandFrame, response_len: usize) -> Result<Bytes, PecmacError> {
        let address = self.config.address;

        debug!(bytes = %frame, "I2C Write");
        self.bus
            .write(address, frame.as_bytes())
            .inspect_err(|e| error!("Write of {} failed: {e}", frame))?;

        self.bus.delay(SETTLE_DELAY);

        let response = self
            .bus
            .read(address, response_len)
            .inspect_err(|e| error!("Read of {response_len} bytes failed: {e}"))?;
        if response.len() < response_len {
            let err = BusError::ShortRead {
                address,
                expected: response_len,
                actual: response.len(),
            };
            error!("{err}");
            return Err(err.into());
        }
        if response.len() > response_len {
            error!("Read returned {} bytes, expected {response_len}", response.len());
            return Err(PecmacError::MalformedResponse {
                expected: response_len,
                actual: response.len(),
            });
        }
        debug!(bytes = hex::encode(&response), "I2C Read");
        Ok(response)
    }
}
