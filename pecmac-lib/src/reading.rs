//! Channel identifiers, channel ranges and integrity-tagged readings.

use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::PecmacError;

/// A 1-based current-sensing input on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Channel(u8);

impl Channel {
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    pub const fn number(&self) -> u8 {
        self.0
    }
}

impl From<u8> for Channel {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel_{}", self.0)
    }
}

// Map keys must serialize as strings for JSON output.
impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Decoded per-channel values, ordered by channel.
pub type ReadingMap = BTreeMap<Channel, f64>;

/// A closed interval `[start, end]` of channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelRange {
    start: u8,
    end: u8,
}

impl ChannelRange {
    pub fn new(start: u8, end: u8) -> Result<Self, PecmacError> {
        if start == 0 {
            return Err(PecmacError::InvalidRange {
                start,
                end,
                reason: "channels are numbered from 1",
            });
        }
        if start > end {
            return Err(PecmacError::InvalidRange {
                start,
                end,
                reason: "start channel is after end channel",
            });
        }
        Ok(Self { start, end })
    }

    pub fn single(channel: u8) -> Result<Self, PecmacError> {
        Self::new(channel, channel)
    }

    pub fn start(&self) -> u8 {
        self.start
    }

    pub fn end(&self) -> u8 {
        self.end
    }

    /// Number of channels covered, always at least 1.
    pub fn channel_count(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + use<> {
        (self.start..=self.end).map(Channel)
    }

    /// Fails when the range reaches past the last channel of a device.
    pub fn check_within(&self, channel_count: u8) -> Result<(), PecmacError> {
        if self.end > channel_count {
            return Err(PecmacError::InvalidRange {
                start: self.start,
                end: self.end,
                reason: "end channel exceeds the device channel count",
            });
        }
        Ok(())
    }

    /// Splits the range into consecutive sub-ranges of at most `max_channels`.
    ///
    /// A range that already fits is returned as-is.
    pub fn split(self, max_channels: u8) -> Vec<ChannelRange> {
        let step = u16::from(max_channels.max(1));
        if u16::from(self.end - self.start) < step {
            return vec![self];
        }

        let end = u16::from(self.end);
        let mut start = u16::from(self.start);
        let mut chunks = Vec::with_capacity(self.channel_count().div_ceil(usize::from(step)));
        while start <= end {
            let chunk_end = (start + step - 1).min(end);
            chunks.push(ChannelRange {
                start: start as u8,
                end: chunk_end as u8,
            });
            start += step;
        }
        chunks
    }
}

impl fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Outcome of checking a response checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Integrity {
    Verified,
    Suspect { expected: u8, received: u8 },
}

impl Integrity {
    pub fn is_verified(&self) -> bool {
        matches!(self, Integrity::Verified)
    }

    /// Combines two results; the first suspect one wins.
    pub fn combine(self, other: Integrity) -> Integrity {
        match self {
            Integrity::Verified => other,
            suspect => suspect,
        }
    }
}

/// A decoded value together with the integrity of the frame it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verified<T> {
    pub value: T,
    pub integrity: Integrity,
}

impl<T> Verified<T> {
    pub fn new(value: T, integrity: Integrity) -> Self {
        Self { value, integrity }
    }

    pub fn is_verified(&self) -> bool {
        self.integrity.is_verified()
    }

    /// Returns the value only if its checksum matched.
    pub fn into_checked(self) -> Result<T, PecmacError> {
        match self.integrity {
            Integrity::Verified => Ok(self.value),
            Integrity::Suspect { expected, received } => Err(PecmacError::ChecksumMismatch { expected, received }),
        }
    }
}

impl Verified<ReadingMap> {
    pub(crate) fn empty() -> Self {
        Self::new(ReadingMap::new(), Integrity::Verified)
    }

    pub(crate) fn merge(&mut self, other: Verified<ReadingMap>) {
        self.value.extend(other.value);
        self.integrity = self.integrity.combine(other.integrity);
    }
}
