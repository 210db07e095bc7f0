//! Bus access consumed by the driver.

use bytes::Bytes;
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use std::time::Duration;
use tracing::trace;

use crate::constants::{SCAN_FIRST_ADDRESS, SCAN_LAST_ADDRESS};
use crate::error::BusError;

/// A shared, addressable, half-duplex bus.
pub trait Bus {
    /// Addresses of all devices answering on the bus.
    fn scan(&mut self) -> Result<Vec<u8>, BusError>;

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError>;

    /// Reads exactly `len` bytes from `address`.
    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError>;

    /// Blocks for `duration`.
    fn delay(&mut self, duration: Duration);
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn scan(&mut self) -> Result<Vec<u8>, BusError> {
        (**self).scan()
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError> {
        (**self).read(address, len)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

impl<B: Bus + ?Sized> Bus for Box<B> {
    fn scan(&mut self) -> Result<Vec<u8>, BusError> {
        (**self).scan()
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        (**self).write(address, bytes)
    }

    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError> {
        (**self).read(address, len)
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// [`Bus`] over any `embedded-hal` I2C controller and delay provider.
pub struct HalBus<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C, D> HalBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn map_err(address: u8, err: I2C::Error) -> BusError {
        match err.kind() {
            ErrorKind::NoAcknowledge(_) => BusError::Nack { address },
            kind => BusError::Io(format!("{kind:?}")),
        }
    }
}

impl<I2C, D> Bus for HalBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn scan(&mut self) -> Result<Vec<u8>, BusError> {
        let mut present = Vec::new();
        let mut probe = [0u8; 1];
        for address in SCAN_FIRST_ADDRESS..=SCAN_LAST_ADDRESS {
            match self.i2c.read(address, &mut probe) {
                Ok(()) => present.push(address),
                Err(err) => match err.kind() {
                    ErrorKind::NoAcknowledge(_) => {}
                    kind => return Err(BusError::Io(format!("{kind:?} while scanning {address:#04x}"))),
                },
            }
        }
        trace!(?present, "Bus scan complete");
        Ok(present)
    }

    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), BusError> {
        self.i2c.write(address, bytes).map_err(|e| Self::map_err(address, e))
    }

    fn read(&mut self, address: u8, len: usize) -> Result<Bytes, BusError> {
        let mut buf = vec![0u8; len];
        self.i2c.read(address, &mut buf).map_err(|e| Self::map_err(address, e))?;
        Ok(Bytes::from(buf))
    }

    fn delay(&mut self, duration: Duration) {
        let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX);
        self.delay.delay_ms(ms);
    }
}
