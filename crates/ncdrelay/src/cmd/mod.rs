use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use ncdrelay_controller::{Controller, ControllerConfig};
use ncdrelay_transport::{DeviceStream, DEFAULT_BAUD_RATE};
use tracing::debug;

use crate::exit::{controller_error, transport_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod adc;
pub mod bank;
pub mod relay;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Switch or query a single relay.
    #[command(subcommand)]
    Relay(RelayCommand),
    /// Read or drive a bank of 8 relays.
    #[command(subcommand)]
    Bank(BankCommand),
    /// Sample the analog inputs.
    #[command(subcommand)]
    Adc(AdcCommand),
    /// Continuously print all 8 inputs as voltages.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Relay(cmd) => relay::run(cmd, connection, format),
        Command::Bank(cmd) => bank::run(cmd, connection, format),
        Command::Adc(cmd) => adc::run(cmd, connection, format),
        Command::Watch(args) => watch::run(args, connection, format),
        Command::Version(args) => version::run(args),
    }
}

/// How to reach the board. Shared by every device subcommand.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Serial port the board is attached to.
    #[arg(
        long,
        env = "NCDRELAY_PORT",
        value_name = "PATH",
        global = true,
        conflicts_with = "tcp"
    )]
    pub port: Option<PathBuf>,
    /// Network serial bridge to connect to instead of a local port.
    #[arg(long, env = "NCDRELAY_TCP", value_name = "HOST:PORT", global = true)]
    pub tcp: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE, global = true)]
    pub baud: u32,
    /// Deadline for each command (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", global = true)]
    pub timeout: String,
}

#[derive(Subcommand, Debug)]
pub enum RelayCommand {
    /// Energize a relay.
    On(RelayArgs),
    /// De-energize a relay.
    Off(RelayArgs),
    /// Report whether a relay is on.
    Status(RelayArgs),
}

#[derive(Args, Debug)]
pub struct RelayArgs {
    /// Relay index, starting at 1.
    pub relay: u16,
}

#[derive(Subcommand, Debug)]
pub enum BankCommand {
    /// Print the bank's relay bitmask.
    Get(BankArgs),
    /// Overwrite the bank's relay bitmask.
    Set(BankSetArgs),
    /// Energize one relay within a bank.
    On(BankRelayArgs),
    /// De-energize one relay within a bank.
    Off(BankRelayArgs),
}

#[derive(Args, Debug)]
pub struct BankArgs {
    pub bank: u8,
}

#[derive(Args, Debug)]
pub struct BankSetArgs {
    pub bank: u8,
    /// Bitmask as decimal, 0x.. or 0b...
    #[arg(value_parser = parse_byte)]
    pub status: u8,
}

#[derive(Args, Debug)]
pub struct BankRelayArgs {
    pub bank: u8,
    /// Relay position within the bank.
    pub index: u8,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Resolution {
    #[value(name = "8")]
    Eight,
    #[value(name = "10")]
    Ten,
}

impl Resolution {
    pub fn bits(self) -> u8 {
        match self {
            Resolution::Eight => 8,
            Resolution::Ten => 10,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum AdcCommand {
    /// Sample one input.
    Read(AdcReadArgs),
    /// Sample all 8 inputs at once.
    All(AdcAllArgs),
}

#[derive(Args, Debug)]
pub struct AdcReadArgs {
    pub channel: u8,
    #[arg(long, default_value = "8")]
    pub bits: Resolution,
    /// Payload bytes to expect for a 10-bit single read. Boards known to
    /// answer with a full sample need 2.
    #[arg(long, default_value_t = 1)]
    pub payload_len: usize,
}

#[derive(Args, Debug)]
pub struct AdcAllArgs {
    #[arg(long, default_value = "8")]
    pub bits: Resolution,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Pause between samples (e.g. 10ms, 1s).
    #[arg(long, default_value = "10ms")]
    pub interval: String,
    /// Exit after printing N samples.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,
    /// Reference voltage corresponding to full scale.
    #[arg(long, default_value_t = 5.0)]
    pub reference: f64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Open the configured device and start a controller on it.
pub fn connect(connection: &ConnectionArgs) -> CliResult<Controller> {
    connect_with(connection, ControllerConfig::default())
}

pub fn connect_with(connection: &ConnectionArgs, config: ControllerConfig) -> CliResult<Controller> {
    let timeout = parse_duration(&connection.timeout)?;
    let stream = match (&connection.port, &connection.tcp) {
        (Some(path), _) => DeviceStream::open_serial(path, connection.baud, timeout),
        (None, Some(addr)) => DeviceStream::connect_tcp(addr, timeout),
        (None, None) => {
            return Err(CliError::usage(
                "no device given: pass --port or --tcp (or set NCDRELAY_PORT / NCDRELAY_TCP)",
            ))
        }
    }
    .map_err(|err| transport_error("connect failed", err))?;
    debug!(?stream, ?timeout, "device stream open");

    let config = ControllerConfig {
        default_timeout: timeout,
        ..config
    };
    Controller::with_config(stream, config)
        .map_err(|err| controller_error("controller start failed", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = match input.strip_suffix("ms") {
        Some(num) => (num, true),
        None => (input.strip_suffix('s').unwrap_or(input), false),
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Parse a byte given as decimal, `0x` hex or `0b` binary.
pub fn parse_byte(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let lower = input.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u8::from_str_radix(&bin.replace('_', ""), 2)
    } else {
        input.parse()
    };
    parsed.map_err(|err| format!("invalid byte {input:?}: {err}"))
}
