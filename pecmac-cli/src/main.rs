use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use linux_embedded_hal::{Delay, I2cdev};
use pecmac_lib::sim::SimulatedPecmac;
use pecmac_lib::{Bus, CurrentScaling, CurrentUnit, DriverConfig, HalBus, Integrity, LogLevel, Pecmac, PecmacError, ReadingMap, Verified};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::{signal, time::sleep};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use uom::fmt::DisplayStyle::Abbreviation;
use uom::si::electric_current::{ampere, milliampere};

type Device = Pecmac<Box<dyn Bus + Send>>;

/// Read currents, calibration and identity from a PECMAC current monitor.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// I2C bus device node.
    #[arg(short, long, default_value = "/dev/i2c-1")]
    bus: PathBuf,
    /// JSON driver configuration; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Device address, decimal or 0x-prefixed hex.
    #[arg(short, long, value_parser = parse_address)]
    address: Option<u8>,
    /// Number of channels fitted to the device.
    #[arg(long)]
    channels: Option<u8>,
    /// Current unit: mA or A.
    #[arg(short, long)]
    unit: Option<CurrentUnit>,
    /// Apply the unit divisor to the low byte only (low_byte) or to the whole sample (whole_count).
    #[arg(long)]
    scaling: Option<CurrentScaling>,
    /// Driver log level: ALL, DEBUG, INFO, ERROR or NONE.
    #[arg(short, long)]
    log_level: Option<LogLevel>,
    /// Fail reads with a bad checksum instead of returning suspect values.
    #[arg(long)]
    strict: bool,
    /// Talk to a simulated device instead of the bus.
    #[arg(long)]
    simulate: bool,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List addresses answering on the bus.
    Scan,
    /// Show sensor type, rated current and channel count.
    Info,
    /// Read channel currents.
    Current {
        #[arg(default_value_t = 1)]
        start: u8,
        /// Last channel; defaults to the configured channel count.
        end: Option<u8>,
    },
    /// Read channel calibration constants.
    Calibration {
        #[arg(default_value_t = 1)]
        start: u8,
        end: Option<u8>,
    },
    /// Poll all channels until Ctrl+C is pressed.
    Monitor {
        /// Polling interval in milliseconds.
        #[arg(short, long, default_value_t = 1000)]
        interval_ms: u64,
        /// Stop after this many samples.
        #[arg(short, long)]
        samples: Option<u32>,
    },
}

#[derive(Serialize)]
struct Sample<'a> {
    timestamp: DateTime<Utc>,
    unit: CurrentUnit,
    integrity: Integrity,
    readings: &'a ReadingMap,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::select! {
        res = run(cli) => {
            if let Err(e) = res {
                eprintln!("Application failed: {:?}", e);
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            eprintln!("Ctrl+C received, shutting down.");
        }
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let mut bus = open_bus(&cli, &config)?;

    if let Command::Scan = cli.command {
        let present = bus.scan().context("Bus scan failed")?;
        if cli.json {
            println!("{}", serde_json::to_string(&present)?);
        } else if present.is_empty() {
            println!("No devices found.");
        } else {
            for address in present {
                println!("{address:#04x}");
            }
        }
        return Ok(());
    }

    let sink = log_sink(config.log_level);
    let device = Pecmac::new(bus, config)?.with_log_sink(sink);
    let (mut device, _) = tokio::task::spawn_blocking(move || {
        let mut device = device;
        let present = probe_or_warn(&mut device);
        (device, present)
    })
    .await
    .context("Driver task panicked")?;
    let channels = device.config().channels;

    match cli.command {
        Command::Scan => unreachable!("handled above"),
        Command::Info => {
            let (_, identity) = blocking(device, |d| d.identity()).await?;
            if cli.json {
                println!("{}", serde_json::to_string(&identity)?);
            } else {
                println!("Sensor type:  {}", identity.sensor_type);
                println!("Max current:  {}", identity.max_current);
                println!("Channels:     {}", identity.channel_count);
            }
        }
        Command::Current { start, end } => {
            let end = end.unwrap_or(channels);
            let unit = device.config().unit;
            let (_, readings) = blocking(device, move |d| d.read_current(start, end)).await?;
            print_currents(&readings, unit, cli.json)?;
        }
        Command::Calibration { start, end } => {
            let end = end.unwrap_or(channels);
            let (_, calibration) = blocking(device, move |d| d.read_calibration(start, end)).await?;
            if cli.json {
                println!("{}", serde_json::to_string(&calibration)?);
            } else {
                for (channel, constant) in &calibration.value {
                    println!("{channel:<11} {constant:>8.0}");
                }
                warn_if_suspect(calibration.integrity);
            }
        }
        Command::Monitor { interval_ms, samples } => {
            let unit = device.config().unit;
            let mut taken = 0u32;
            loop {
                let (returned, result) = tokio::task::spawn_blocking(move || {
                    let result = device.read_all_currents();
                    (device, result)
                })
                .await
                .context("Driver task panicked")?;
                device = returned;

                match result {
                    Ok(readings) => print_currents(&readings, unit, cli.json)?,
                    Err(e) => eprintln!("Read failed: {e}"),
                }

                taken += 1;
                if samples.is_some_and(|n| taken >= n) {
                    break;
                }
                sleep(Duration::from_millis(interval_ms)).await;
            }
        }
    }
    Ok(())
}

/// Runs a driver operation on the blocking pool; the driver sleeps between
/// write and read.
async fn blocking<T, F>(mut device: Device, op: F) -> Result<(Device, T)>
where
    T: Send + 'static,
    F: FnOnce(&mut Device) -> Result<T, PecmacError> + Send + 'static,
{
    let (device, result) = tokio::task::spawn_blocking(move || {
        let result = op(&mut device);
        (device, result)
    })
    .await
    .context("Driver task panicked")?;
    Ok((device, result?))
}

/// Checks the device answers, warning instead of failing when it does not.
fn probe_or_warn(device: &mut Device) -> bool {
    match device.probe() {
        Ok(()) => true,
        Err(e) => {
            eprintln!("warning: {e}; continuing anyway");
            false
        }
    }
}

fn load_config(cli: &Cli) -> Result<DriverConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            DriverConfig::from_json(&json).with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => DriverConfig::default(),
    };

    if let Some(address) = cli.address {
        config = config.with_address(address);
    }
    if let Some(channels) = cli.channels {
        config = config.with_channels(channels);
    }
    if let Some(unit) = cli.unit {
        config = config.with_unit(unit);
    }
    if let Some(scaling) = cli.scaling {
        config = config.with_scaling(scaling);
    }
    if let Some(level) = cli.log_level {
        config = config.with_log_level(level);
    }
    if cli.strict {
        config = config.with_strict_checksum(true);
    }
    config.validate()?;
    Ok(config)
}

fn open_bus(cli: &Cli, config: &DriverConfig) -> Result<Box<dyn Bus + Send>> {
    if cli.simulate {
        let currents: Vec<u32> = (1..=u32::from(config.channels)).map(|ch| ch * 1_250).collect();
        let sim = SimulatedPecmac::new(config.channels)
            .with_address(config.address)
            .with_currents(&currents)
            .with_calibration(&vec![300; usize::from(config.channels)]);
        return Ok(Box::new(sim));
    }

    let i2c = I2cdev::new(&cli.bus).map_err(|e| anyhow!("Failed to open {}: {e:?}", cli.bus.display()))?;
    Ok(Box::new(HalBus::new(i2c, Delay)))
}

fn log_sink(level: LogLevel) -> Dispatch {
    let filter = EnvFilter::builder()
        .with_default_directive(level.level_filter().into())
        .from_env_lossy();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    Dispatch::new(subscriber)
}

fn print_currents(readings: &Verified<ReadingMap>, unit: CurrentUnit, json: bool) -> Result<()> {
    if json {
        let sample = Sample {
            timestamp: Utc::now(),
            unit,
            integrity: readings.integrity,
            readings: &readings.value,
        };
        println!("{}", serde_json::to_string(&sample)?);
        return Ok(());
    }

    for (channel, value) in &readings.value {
        let current = unit.to_quantity(*value);
        match unit {
            CurrentUnit::Milliamps => {
                println!("{channel:<11} {:>12.1}", current.into_format_args(milliampere, Abbreviation))
            }
            CurrentUnit::Amps => println!("{channel:<11} {:>12.3}", current.into_format_args(ampere, Abbreviation)),
        }
    }
    warn_if_suspect(readings.integrity);
    Ok(())
}

fn warn_if_suspect(integrity: Integrity) {
    if let Integrity::Suspect { expected, received } = integrity {
        eprintln!("warning: checksum mismatch (expected {expected:#04x}, received {received:#04x}); values may be corrupt");
    }
}

fn parse_address(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}
