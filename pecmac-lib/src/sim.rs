//! Buses that stand in for hardware.
//!
//! - [`ScriptedBus`] replays canned responses and injected faults and records
//!   every bus operation, for checking exact wire behaviour.
//! - [`SimulatedPecmac`] behaves like a device: it parses each command frame
//!   and answers from its own channel state.

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use zerocopy::IntoBytes;
use zerocopy::byteorder::big_endian::U16;

use crate::bus::Bus;
use crate::constants::DEFAULT_ADDRESS;
use crate::decode::{CurrentRaw, DeviceIdentity, IdentityRaw};
use crate::error::BusError;
use crate::frame::{CommandCode, CommandFrame, checksum};

/// A bus operation observed by [`ScriptedBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Scan,
    Write { address: u8, bytes: Vec<u8> },
    Delay(Duration),
    Read { address: u8, len: usize },
}

/// Replays scripted read results in order.
///
/// Reads return the scripted bytes as-is, whatever length was requested.
/// A read with nothing left in the script fails with a NACK.
#[derive(Debug, Default)]
pub struct ScriptedBus {
    present: Vec<u8>,
    reads: VecDeque<Result<Vec<u8>, BusError>>,
    write_faults: VecDeque<BusError>,
    events: Vec<BusEvent>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `address` to the scan result.
    pub fn with_device(mut self, address: u8) -> Self {
        self.present.push(address);
        self
    }

    pub fn respond(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.reads.push_back(Ok(bytes.into()));
        self
    }

    pub fn fail_read(mut self, err: BusError) -> Self {
        self.reads.push_back(Err(err));
        self
    }

    /// Queues a write fault; each write consumes one queued fault, if any.
    pub fn fail_write(mut self, err: BusError) -> Self {
        self.write_faults.push_back(err);
        self
    }

    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    pub fn writes(&self) -> Vec<&[u8]> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write { bytes, .. } => Some(bytes.as_slice()),
                _ => None,
            })
            .collect()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Delay(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn remaining_responses(&self) -> usize {
        self.reads.len()
    }
}

impl Bus for ScriptedBus {
    fn scan(&mut self) -> Result<Vec<u8>, BusError> {
        self.events.push(BusEvent::Scan);
        Ok(self.present.clone())
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.events.push(BusEvent::Write {
            address,
            bytes: bytes.to_vec(),
        });
        match self.write_faults.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError> {
        self.events.push(BusEvent::Read { address, len });
        match self.reads.pop_front() {
            Some(result) => result.map(Bytes::from),
            None => Err(BusError::Nack { address }),
        }
    }

    fn delay(&mut self, duration: Duration) {
        self.events.push(BusEvent::Delay(duration));
    }
}

/// A PECMAC device answering from in-memory channel state.
///
/// Delays are accumulated rather than slept.
#[derive(Debug, Clone)]
pub struct SimulatedPecmac {
    address: u8,
    identity: DeviceIdentity,
    currents_ma: Vec<u32>,
    calibration: Vec<u16>,
    pending: Option<CommandFrame>,
    transfer_limit: Option<usize>,
    corrupt_checksums: bool,
    commands: Vec<CommandFrame>,
    elapsed: Duration,
}

impl SimulatedPecmac {
    /// A device with `channels` inputs, all reading zero.
    pub fn new(channels: u8) -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            identity: DeviceIdentity {
                sensor_type: 1,
                max_current: 70,
                channel_count: channels,
            },
            currents_ma: vec![0; usize::from(channels)],
            calibration: vec![0; usize::from(channels)],
            pending: None,
            transfer_limit: None,
            corrupt_checksums: false,
            commands: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_identity(mut self, sensor_type: u8, max_current: u8) -> Self {
        self.identity.sensor_type = sensor_type;
        self.identity.max_current = max_current;
        self
    }

    /// Sets channel currents in milliamps, starting at channel 1.
    pub fn with_currents(mut self, milliamps: &[u32]) -> Self {
        for (slot, value) in self.currents_ma.iter_mut().zip(milliamps) {
            *slot = *value;
        }
        self
    }

    pub fn with_calibration(mut self, constants: &[u16]) -> Self {
        for (slot, value) in self.calibration.iter_mut().zip(constants) {
            *slot = *value;
        }
        self
    }

    /// Fails reads longer than `bytes`, like a small fixed bus buffer.
    pub fn with_transfer_limit(mut self, bytes: usize) -> Self {
        self.transfer_limit = Some(bytes);
        self
    }

    /// Makes every response carry a wrong checksum.
    pub fn with_corrupt_checksums(mut self, corrupt: bool) -> Self {
        self.corrupt_checksums = corrupt;
        self
    }

    pub fn set_current(&mut self, channel: u8, milliamps: u32) {
        if let Some(slot) = self.currents_ma.get_mut(usize::from(channel).wrapping_sub(1)) {
            *slot = milliamps;
        }
    }

    /// Every command received, in order.
    pub fn commands(&self) -> &[CommandFrame] {
        &self.commands
    }

    /// Total time spent in delays.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn channel_slice<'a, T>(&self, values: &'a [T], frame: &CommandFrame) -> Result<&'a [T], BusError> {
        let (start, end) = (usize::from(frame.param_a()), usize::from(frame.param_b()));
        if start == 0 || start > end || end > values.len() {
            return Err(BusError::Io(format!("device rejected channel range {start}..={end}")));
        }
        Ok(&values[start - 1..end])
    }

    fn seal(&self, mut data: Vec<u8>) -> Vec<u8> {
        let sum = checksum(&data);
        data.push(if self.corrupt_checksums { sum.wrapping_add(1) } else { sum });
        data
    }

    fn respond(&self, frame: &CommandFrame) -> Result<Vec<u8>, BusError> {
        let command = frame.command().map_err(|e| BusError::Io(e.to_string()))?;
        match command {
            CommandCode::ReadIdentity => {
                let raw = IdentityRaw {
                    sensor_type: self.identity.sensor_type,
                    max_current: self.identity.max_current,
                    channel_count: self.identity.channel_count,
                    reserved: [0; 4],
                };
                Ok(raw.as_bytes().to_vec())
            }
            CommandCode::ReadCurrent => {
                let data = self
                    .channel_slice(&self.currents_ma, frame)?
                    .iter()
                    .flat_map(|ma| CurrentRaw::from_count(*ma).as_bytes().to_vec())
                    .collect();
                Ok(self.seal(data))
            }
            CommandCode::ReadCalibration => {
                let data = self
                    .channel_slice(&self.calibration, frame)?
                    .iter()
                    .flat_map(|c| U16::new(*c).as_bytes().to_vec())
                    .collect();
                Ok(self.seal(data))
            }
            CommandCode::Calibrate => Err(BusError::Io("calibrate is not supported".to_string())),
        }
    }
}

impl Bus for SimulatedPecmac {
    fn scan(&mut self) -> Result<Vec<u8>, BusError> {
        Ok(vec![self.address])
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        if address != self.address {
            return Err(BusError::Nack { address });
        }
        let frame = CommandFrame::parse(bytes).map_err(|e| BusError::Io(e.to_string()))?;
        self.commands.push(frame);
        self.pending = Some(frame);
        Ok(())
    }

    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError> {
        if address != self.address {
            return Err(BusError::Nack { address });
        }
        if let Some(limit) = self.transfer_limit {
            if len > limit {
                return Err(BusError::Io(format!(
                    "transfer of {len} bytes exceeds bus buffer of {limit}"
                )));
            }
        }
        let frame = self
            .pending
            .take()
            .ok_or_else(|| BusError::Io("no command pending".to_string()))?;
        let mut response = self.respond(&frame)?;
        if response.len() < len {
            return Err(BusError::ShortRead {
                address,
                expected: len,
                actual: response.len(),
            });
        }
        response.truncate(len);
        Ok(Bytes::from(response))
    }

    fn delay(&mut self, duration: Duration) {
        self.elapsed += duration;
    }
}
