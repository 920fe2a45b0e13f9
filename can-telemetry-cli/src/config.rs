//! Configuration loading and resolution
//!
//! Settings come from an optional TOML file and from command line flags.
//! A flag always wins over the file; anything set in neither falls back to a
//! default.

use anyhow::{bail, Context, Result};
use can_telemetry::{DisplayOptions, MonitorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Interface used when neither the flags nor the file name one
pub const DEFAULT_INTERFACE: &str = "can0";

/// Application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub dbc: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TransportConfig {
    pub kind: Option<TransportKind>,
    pub interface: Option<String>,
    /// candump log to replay
    pub file: Option<PathBuf>,
    pub timeout_ms: Option<u64>,
    pub max_frames: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Socketcan,
    Candump,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WatchConfig {
    pub ids: Option<Vec<u32>>,
    pub signals: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    pub format: Option<OutputFormat>,
    /// `labels` table and `precision`
    #[serde(flatten)]
    pub display: DisplayOptions,
    /// Dashboard columns, in order
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One line per decoded signal
    Lines,
    /// Single status line redrawn in place
    Dashboard,
    /// One JSON object per decoded frame
    Json,
}

/// Values given on the command line for `run`
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub dbc: Vec<PathBuf>,
    pub interface: Option<String>,
    pub candump: Option<PathBuf>,
    pub watch: Vec<u32>,
    pub signals: Vec<String>,
    pub format: Option<OutputFormat>,
    pub timeout_ms: Option<u64>,
    pub max_frames: Option<usize>,
    pub precision: Option<usize>,
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    SocketCan(String),
    Candump(PathBuf),
}

/// Fully resolved settings for one `run`
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub dbc: Vec<PathBuf>,
    pub transport: Transport,
    pub monitor: MonitorConfig,
    pub format: OutputFormat,
    pub display: DisplayOptions,
    pub columns: Vec<String>,
}

/// Load configuration from a TOML file
///
/// Relative paths in the file are taken relative to the file's directory.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if let Some(base) = path.parent() {
        config.rebase_paths(base);
    }

    Ok(config)
}

impl AppConfig {
    fn rebase_paths(&mut self, base: &Path) {
        for dbc in &mut self.schema.dbc {
            if dbc.is_relative() {
                *dbc = base.join(&*dbc);
            }
        }
        if let Some(file) = &mut self.transport.file {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    /// Schema sources: flags first, then the file
    pub fn dbc_files(&self, cli: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let dbc = if cli.is_empty() {
            self.schema.dbc.clone()
        } else {
            cli.to_vec()
        };
        if dbc.is_empty() {
            bail!("No DBC file given (use --dbc or [schema] dbc in the config file)");
        }
        Ok(dbc)
    }
}

/// Merge command line values over the file configuration
pub fn resolve(file: AppConfig, cli: RunOverrides) -> Result<RunSettings> {
    let dbc = file.dbc_files(&cli.dbc)?;

    let transport = if let Some(path) = cli.candump {
        Transport::Candump(path)
    } else if let Some(interface) = cli.interface {
        Transport::SocketCan(interface)
    } else {
        match (file.transport.kind, file.transport.file) {
            (Some(TransportKind::Candump), None) => {
                bail!("[transport] kind = \"candump\" needs a file")
            }
            (Some(TransportKind::Candump), Some(path)) | (None, Some(path)) => {
                Transport::Candump(path)
            }
            (Some(TransportKind::Socketcan), _) | (None, None) => Transport::SocketCan(
                file.transport
                    .interface
                    .unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
            ),
        }
    };

    let mut monitor = MonitorConfig::new();
    if let Some(ids) = non_empty(cli.watch).or(file.watch.ids) {
        monitor = monitor.with_watch_ids(ids);
    }
    if let Some(signals) = non_empty(cli.signals).or(file.watch.signals) {
        monitor = monitor.with_signal_filter(signals);
    }
    if let Some(ms) = cli.timeout_ms.or(file.transport.timeout_ms) {
        monitor = monitor.with_receive_timeout(Duration::from_millis(ms));
    }
    if let Some(max) = cli.max_frames.or(file.transport.max_frames) {
        monitor = monitor.with_max_frames(max);
    }

    let mut display = file.output.display;
    if let Some(precision) = cli.precision {
        display = display.with_precision(precision);
    }

    Ok(RunSettings {
        dbc,
        transport,
        monitor,
        format: cli
            .format
            .or(file.output.format)
            .unwrap_or(OutputFormat::Lines),
        display,
        columns: file.output.columns,
    })
}

fn non_empty<T>(values: Vec<T>) -> Option<Vec<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}
