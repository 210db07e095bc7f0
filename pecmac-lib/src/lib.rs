//! Driver for PECMAC multi-channel I2C current monitors.
//!
//! The host sends 8-byte command frames and the device answers with packed
//! big-endian readings followed by a modulo-256 checksum. [`Pecmac`] runs the
//! write → settle → read cycles, splits large channel ranges into transfers
//! of at most five channels, and returns readings tagged with their checksum
//! status.
//!
//! ```no_run
//! use pecmac_lib::{DriverConfig, Pecmac, sim::SimulatedPecmac};
//!
//! let bus = SimulatedPecmac::new(6).with_currents(&[1200, 0, 350]);
//! let mut device = Pecmac::new(bus, DriverConfig::default())?;
//! let readings = device.read_current(1, 6)?;
//! for (channel, ma) in &readings.value {
//!     println!("{channel}: {ma} mA");
//! }
//! # Ok::<(), pecmac_lib::PecmacError>(())
//! ```

pub mod bus;
pub mod config;
pub mod constants;
pub mod decode;
pub mod device;
pub mod error;
pub mod frame;
pub mod reading;
pub mod sim;


pub use bus::{Bus, HalBus};
pub use config::{CurrentScaling, CurrentUnit, DriverConfig, LogLevel};
pub use decode::DeviceIdentity;
pub use device::{Pecmac, SETTLE_DELAY};
pub use error::{BusError, PecmacError};
pub use reading::{Channel, ChannelRange, Integrity, ReadingMap, Verified};
