use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;
use tracing::level_filters::LevelFilter;
use uom::si::electric_current::{ampere, milliampere};
use uom::si::f64::ElectricCurrent;

use crate::constants::{DEFAULT_ADDRESS, DEFAULT_CHANNELS};
use crate::error::PecmacError;

/// Unit of decoded current readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
pub enum CurrentUnit {
    #[default]
    #[strum(to_string = "mA")]
    #[serde(rename = "mA", alias = "milliamps")]
    Milliamps,
    #[strum(to_string = "A")]
    #[serde(rename = "A", alias = "amps")]
    Amps,
}

impl CurrentUnit {
    /// Divisor applied to raw current samples, see [`CurrentScaling`]
    pub fn divisor(&self) -> f64 {
        match self {
            CurrentUnit::Milliamps => 1.0,
            CurrentUnit::Amps => 1000.0,
        }
    }

    /// Converts a reading in this unit to a typed quantity
    pub fn to_quantity(&self, value: f64) -> ElectricCurrent {
        match self {
            CurrentUnit::Milliamps => ElectricCurrent::new::<milliampere>(value),
            CurrentUnit::Amps => ElectricCurrent::new::<ampere>(value),
        }
    }
}

impl FromStr for CurrentUnit {
    type Err = PecmacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ma" | "milliamps" => Ok(CurrentUnit::Milliamps),
            "a" | "amps" => Ok(CurrentUnit::Amps),
            other => Err(PecmacError::Config(format!("unknown current unit '{other}'"))),
        }
    }
}

/// How the unit divisor is applied to a 24-bit current sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CurrentScaling {
    /// `msb_high·65536 + msb·256 + lsb/divisor`, as the device firmware documents it
    #[default]
    LowByte,
    /// `(msb_high·65536 + msb·256 + lsb) / divisor`
    WholeCount,
}

impl CurrentScaling {
    /// Scales a `(msb_high, msb, lsb)` sample by `divisor`.
    pub fn apply(&self, msb_high: u8, msb: u8, lsb: u8, divisor: f64) -> f64 {
        let high = f64::from(msb_high) * 65_536.0 + f64::from(msb) * 256.0;
        match self {
            CurrentScaling::LowByte => high + f64::from(lsb) / divisor,
            CurrentScaling::WholeCount => (high + f64::from(lsb)) / divisor,
        }
    }
}

impl FromStr for CurrentScaling {
    type Err = PecmacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "low_byte" => Ok(CurrentScaling::LowByte),
            "whole_count" => Ok(CurrentScaling::WholeCount),
            other => Err(PecmacError::Config(format!("unknown current scaling '{other}'"))),
        }
    }
}

/// Driver log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum LogLevel {
    All,
    Debug,
    Info,
    Error,
    #[default]
    None,
}

impl LogLevel {
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            LogLevel::All => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::None => LevelFilter::OFF,
        }
    }
}

impl FromStr for LogLevel {
    type Err = PecmacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(LogLevel::All),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "ERROR" => Ok(LogLevel::Error),
            "NONE" => Ok(LogLevel::None),
            other => Err(PecmacError::Config(format!("unknown log level '{other}'"))),
        }
    }
}

/// Fixed configuration of a driver instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    /// 7-bit bus address of the device
    pub address: u8,
    /// Number of channels fitted to the device
    pub channels: u8,
    pub unit: CurrentUnit,
    pub scaling: CurrentScaling,
    pub log_level: LogLevel,
    /// Fail reads whose checksum does not match instead of returning suspect data
    pub strict_checksum: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            channels: DEFAULT_CHANNELS,
            unit: CurrentUnit::default(),
            scaling: CurrentScaling::default(),
            log_level: LogLevel::default(),
            strict_checksum: false,
        }
    }
}

impl DriverConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_unit(mut self, unit: CurrentUnit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_scaling(mut self, scaling: CurrentScaling) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_strict_checksum(mut self, strict: bool) -> Self {
        self.strict_checksum = strict;
        self
    }

    pub fn validate(&self) -> Result<(), PecmacError> {
        if self.address > 0x7F {
            return Err(PecmacError::Config(format!(
                "address {:#04x} is not a 7-bit address",
                self.address
            )));
        }
        if self.channels == 0 {
            return Err(PecmacError::Config("channel count must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, PecmacError> {
        let config: DriverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
