//! Error types for the telemetry reader
//!
//! Only [`SchemaLoadError`] and [`MonitorError`] are fatal. Decode and sink
//! failures are reported per frame and never leave the dispatch loop.

use std::io;

/// Errors raised while building the message schema from DBC sources
#[derive(Debug, thiserror::Error)]
pub enum SchemaLoadError {
    #[error("Failed to read schema {source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: io::Error,
    },

    #[error("Failed to parse DBC {source_name}: {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Invalid signal '{signal}' in message 0x{can_id:X}: {reason}")]
    InvalidSignal {
        can_id: u32,
        signal: String,
        reason: String,
    },

    #[error("Message 0x{can_id:X} is defined in both {first} and {second}")]
    DuplicateMessage {
        can_id: u32,
        first: String,
        second: String,
    },

    #[error("Schema {0} defines no messages")]
    Empty(String),

    #[error("No schema sources given")]
    NoSources,
}

/// Errors raised by a frame source or by frame transmission
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to open {endpoint}: {error}")]
    Open {
        endpoint: String,
        #[source]
        error: io::Error,
    },

    #[error("Receive failed on {endpoint}: {error}")]
    Receive {
        endpoint: String,
        #[source]
        error: io::Error,
    },

    #[error("Transmit failed on {endpoint}: {error}")]
    Transmit {
        endpoint: String,
        #[source]
        error: io::Error,
    },

    #[error("{0} transport is not available on this platform")]
    Unsupported(String),

    #[error("Frame rejected by {endpoint}: {reason}")]
    InvalidFrame { endpoint: String, reason: String },
}

/// Per-signal extraction failure. Scoped to a single frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Signal '{signal}' needs {required} bytes but frame 0x{can_id:X} carries {available}")]
    FrameTooShort {
        can_id: u32,
        signal: String,
        required: usize,
        available: usize,
    },

    #[error("Signal '{signal}' does not fit the 64-bit payload (start bit {start_bit}, length {length})")]
    OutOfRange {
        signal: String,
        start_bit: u16,
        length: u16,
    },
}

/// A raw frame that violates classic CAN limits or could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("CAN ID 0x{0:X} exceeds the 29-bit identifier range")]
    IdOutOfRange(u32),

    #[error("Standard CAN ID 0x{0:X} exceeds 11 bits")]
    StandardIdOutOfRange(u32),

    #[error("Payload of {0} bytes exceeds the 8 byte classic CAN limit")]
    PayloadTooLong(usize),

    #[error("Malformed frame text '{text}': {reason}")]
    Syntax { text: String, reason: String },
}

/// Failure inside a telemetry sink. Logged by the loop, never fatal.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink write failed: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize telemetry: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Fatal error that ends the dispatch loop
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Transport(#[from] TransportError),
}
