//! CAN Telemetry CLI Application
//!
//! Command-line front end for the can-telemetry library:
//! - `run`: decode live (SocketCAN) or replayed (candump) traffic and print it
//! - `inspect`: show what a set of DBC files defines
//! - `send`: put a single frame on the bus for bench testing

use anyhow::{bail, Context, Result};
use can_telemetry::schema::{ByteOrder, ValueType};
use can_telemetry::source::candump::parse_frame_text;
use can_telemetry::source::socket::send_frame;
use can_telemetry::types::MAX_EXTENDED_ID;
use can_telemetry::{
    CancelToken, CandumpSource, DashboardSink, JsonLinesSink, LineSink, MessageSchema, Monitor,
    SocketCanSource, TelemetrySink,
};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod config;

use config::{AppConfig, OutputFormat, RunOverrides, Transport};

/// CAN Telemetry - decode and display live CAN signals
#[derive(Parser, Debug)]
#[command(name = "can-telemetry")]
#[command(about = "Decode live CAN traffic with DBC signal definitions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all log output except errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode frames and print signal values until interrupted
    Run(RunArgs),

    /// Load DBC files and list their messages and signals
    Inspect {
        /// Path to DBC file(s) (can be repeated)
        #[arg(long, value_name = "FILE")]
        dbc: Vec<PathBuf>,

        /// Path to configuration file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Transmit one frame, e.g. `send 55B#F401`
    Send {
        /// SocketCAN interface
        #[arg(short, long, default_value = config::DEFAULT_INTERFACE)]
        interface: String,

        /// Frame as ID#HEXDATA (candump notation)
        frame: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to DBC file(s) (can be repeated)
    #[arg(long, value_name = "FILE")]
    dbc: Vec<PathBuf>,

    /// SocketCAN interface to listen on
    #[arg(short, long, conflicts_with = "candump")]
    interface: Option<String>,

    /// Replay a `candump -L` log instead of listening on an interface
    #[arg(long, value_name = "FILE")]
    candump: Option<PathBuf>,

    /// Only decode these message IDs, hex (e.g. 55B,0x5B3)
    #[arg(short, long, value_name = "ID", value_delimiter = ',', value_parser = parse_can_id)]
    watch: Vec<u32>,

    /// Only print these signals (can be repeated)
    #[arg(short, long, value_name = "NAME")]
    signal: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    format: Option<OutputFormat>,

    /// Decimal places for scaled values
    #[arg(long)]
    precision: Option<usize>,

    /// Upper bound for one blocking receive
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Stop after this many frames
    #[arg(long, value_name = "COUNT")]
    max_frames: Option<usize>,
}

impl RunArgs {
    fn overrides(&self) -> RunOverrides {
        RunOverrides {
            dbc: self.dbc.clone(),
            interface: self.interface.clone(),
            candump: self.candump.clone(),
            watch: self.watch.clone(),
            signals: self.signal.clone(),
            format: self.format,
            timeout_ms: self.timeout_ms,
            max_frames: self.max_frames,
            precision: self.precision,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    log::info!("CAN Telemetry v{}", env!("CARGO_PKG_VERSION"));
    log::debug!("Using can-telemetry library v{}", can_telemetry::VERSION);

    match cli.command {
        Command::Run(args) => run_command(&args),
        Command::Inspect { dbc, config } => inspect_command(&dbc, config.as_ref()),
        Command::Send { interface, frame } => send_command(&interface, &frame),
    }
}

fn file_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)
        }
        None => Ok(AppConfig::default()),
    }
}

/// Decode frames until Ctrl-C, end of log or a fatal transport error
fn run_command(args: &RunArgs) -> Result<()> {
    let settings = config::resolve(file_config(args.config.as_ref())?, args.overrides())?;

    let schema =
        MessageSchema::load(settings.dbc.as_slice()).context("Failed to load signal schema")?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let mut sink: Box<dyn TelemetrySink> = match settings.format {
        OutputFormat::Lines => Box::new(LineSink::stdout(settings.display)),
        OutputFormat::Dashboard => {
            Box::new(DashboardSink::stdout(settings.columns, settings.display))
        }
        OutputFormat::Json => Box::new(JsonLinesSink::stdout()),
    };

    let mut monitor = Monitor::new(&schema, settings.monitor);
    let reason = match &settings.transport {
        Transport::SocketCan(interface) => {
            monitor.run(|| SocketCanSource::open(interface), &mut sink, &cancel)
        }
        Transport::Candump(path) => monitor.run(|| CandumpSource::open(path), &mut sink, &cancel),
    }
    .context("Telemetry loop failed")?;

    log::info!("Shut down: {}", reason);
    Ok(())
}

/// Print the messages and signals a schema defines
fn inspect_command(dbc: &[PathBuf], config_path: Option<&PathBuf>) -> Result<()> {
    let dbc = file_config(config_path)?.dbc_files(dbc)?;
    let schema = MessageSchema::load(dbc.as_slice()).context("Failed to load signal schema")?;

    let stats = schema.stats();
    println!("Signal Database:");
    println!("  Messages: {}", stats.num_messages);
    println!("  Signals:  {}", stats.num_signals);

    for message in schema.messages() {
        println!();
        println!(
            "0x{:03X} {} ({} bytes, from {})",
            message.id,
            message.name,
            message.size,
            message.sender.as_deref().unwrap_or("?")
        );
        for signal in &message.signals {
            let order = match signal.byte_order {
                ByteOrder::LittleEndian => '1',
                ByteOrder::BigEndian => '0',
            };
            let sign = match signal.value_type {
                ValueType::Unsigned => '+',
                ValueType::Signed => '-',
            };
            let mux = match (&signal.multiplexer_info, &message.multiplexer_signal) {
                (Some(info), _) => format!(" m{:?}", info.multiplexer_values),
                (None, Some(name)) if *name == signal.name => " M".to_string(),
                _ => String::new(),
            };
            println!(
                "  {}{} : {}|{}@{}{} ({},{}) [{}|{}] \"{}\"",
                signal.name,
                mux,
                signal.start_bit,
                signal.length,
                order,
                sign,
                signal.factor,
                signal.offset,
                signal.min,
                signal.max,
                signal.unit.as_deref().unwrap_or("")
            );
        }
    }

    Ok(())
}

/// Transmit one frame given in candump notation
fn send_command(interface: &str, text: &str) -> Result<()> {
    let frame = match parse_frame_text(text).with_context(|| format!("Invalid frame: {}", text))? {
        Some(frame) => frame,
        None => bail!("Remote frames cannot be sent: {}", text),
    };

    send_frame(interface, &frame).with_context(|| format!("Failed to send on {}", interface))?;
    println!("Sent {} on {}", frame, interface);
    Ok(())
}

/// Parse a CAN ID given in hex, with or without a `0x` prefix
fn parse_can_id(text: &str) -> Result<u32, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("'{}' is not a hex CAN ID", text));
    }
    let id = u32::from_str_radix(digits, 16).map_err(|e| format!("'{}': {}", text, e))?;
    if id > MAX_EXTENDED_ID {
        return Err(format!("'{}' exceeds the 29-bit CAN ID range", text));
    }
    Ok(id)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_can_id() {
        assert_eq!(parse_can_id("55B"), Ok(0x55B));
        assert_eq!(parse_can_id("0x5b3"), Ok(0x5B3));
        assert_eq!(parse_can_id("18FEF100"), Ok(0x18FE_F100));
        assert!(parse_can_id("2000000F").is_err());
        assert!(parse_can_id("SOC").is_err());
        assert!(parse_can_id("+55B").is_err());
        assert!(parse_can_id("0x").is_err());
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "can-telemetry",
            "-v",
            "run",
            "--dbc",
            "leaf.dbc",
            "--candump",
            "drive.log",
            "--watch",
            "55B,5B3",
            "--signal",
            "LBC_StateOfCharge",
            "--format",
            "json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let overrides = args.overrides();
        assert_eq!(overrides.watch, vec![0x55B, 0x5B3]);
        assert_eq!(overrides.candump, Some(PathBuf::from("drive.log")));
        assert_eq!(overrides.format, Some(OutputFormat::Json));
        assert_eq!(overrides.signals, vec!["LBC_StateOfCharge".to_string()]);
    }

    #[test]
    fn test_interface_conflicts_with_candump() {
        let result = Cli::try_parse_from([
            "can-telemetry",
            "run",
            "--interface",
            "can0",
            "--candump",
            "drive.log",
        ]);
        assert!(result.is_err());
    }
}
