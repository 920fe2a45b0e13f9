//! CAN Telemetry Library
//!
//! Reads live CAN traffic, decodes it with signal definitions loaded from DBC
//! files and keeps the latest physical value of every signal seen.
//!
//! # Architecture
//!
//! - [`schema`]: message and signal definitions, loaded from one or more DBCs
//! - [`decoder`]: pure frame + schema -> decoded signals
//! - [`source`]: frame sources (SocketCAN, candump log replay, in-memory)
//! - [`state`]: latest-known value per signal
//! - [`sink`]: where decoded telemetry goes (console lines, dashboard, JSON)
//! - [`monitor`]: the dispatch loop tying them together
//!
//! Vehicle-specific IDs and signal names are configuration, never code.
//!
//! # Example Usage
//!
//! ```no_run
//! use can_telemetry::{
//!     CancelToken, DisplayOptions, LineSink, MessageSchema, Monitor, MonitorConfig,
//!     SocketCanSource,
//! };
//!
//! let schema = MessageSchema::load(&["leaf.dbc"]).unwrap();
//! let config = MonitorConfig::new().with_watch_ids(vec![0x55B, 0x5B3]);
//!
//! let mut sink = LineSink::stdout(
//!     DisplayOptions::new().with_label("LBC_StateOfCharge", "LBC SOC"),
//! );
//! let cancel = CancelToken::new();
//!
//! let mut monitor = Monitor::new(&schema, config);
//! let reason = monitor
//!     .run(|| SocketCanSource::open("can0"), &mut sink, &cancel)
//!     .unwrap();
//! println!("Stopped: {}", reason);
//! ```

// Public modules
pub mod config;
pub mod decoder;
pub mod error;
pub mod monitor;
pub mod schema;
pub mod sink;
pub mod source;
pub mod state;
pub mod types;

// Re-export main types for convenience
pub use config::MonitorConfig;
pub use decoder::{decode, Decoded, DecodedFrame, MessageDecoder};
pub use error::{DecodeError, FrameError, MonitorError, SchemaLoadError, SinkError, TransportError};
pub use monitor::{CancelToken, FrameOutcome, Monitor, MonitorPhase, MonitorStats, StopReason};
pub use schema::{MessageDefinition, MessageSchema, SchemaStats, SignalDefinition};
pub use sink::{DashboardSink, DisplayOptions, JsonLinesSink, LineSink, TelemetrySink, TelemetryUpdate};
pub use source::{CandumpSource, FrameSource, IterSource, SocketCanSource, SourceEvent};
pub use state::{SignalReading, TelemetryState};
pub use types::{DecodedSignal, RawFrame, SignalValue, Timestamp};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
