//! Core types for the telemetry reader
//!
//! Raw frames come in from a frame source, decoded frames and signal values go
//! out to the telemetry sinks. Nothing here is retained past one loop
//! iteration except what the latest-known state copies out.

use crate::error::FrameError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Timestamp type used throughout the reader
pub type Timestamp = DateTime<Utc>;

/// Largest 11-bit (standard) identifier
pub const MAX_STANDARD_ID: u32 = 0x7FF;
/// Largest 29-bit (extended) identifier
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;
/// Classic CAN payload limit
pub const MAX_DATA_LEN: usize = 8;

/// Raw CAN frame as delivered by a frame source
///
/// Constructed through [`RawFrame::new`] or [`RawFrame::extended`], which
/// enforce the classic CAN limits on identifier range and payload length.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    can_id: u32,
    is_extended: bool,
    data: Vec<u8>,
    timestamp: Timestamp,
}

impl RawFrame {
    /// Create a frame, picking the extended format when the ID needs 29 bits
    pub fn new(can_id: u32, data: &[u8]) -> Result<Self, FrameError> {
        if can_id > MAX_EXTENDED_ID {
            return Err(FrameError::IdOutOfRange(can_id));
        }
        Self::build(can_id, can_id > MAX_STANDARD_ID, data)
    }

    /// Create a frame with an explicit standard (11-bit) identifier
    pub fn standard(can_id: u32, data: &[u8]) -> Result<Self, FrameError> {
        if can_id > MAX_STANDARD_ID {
            return Err(FrameError::StandardIdOutOfRange(can_id));
        }
        Self::build(can_id, false, data)
    }

    /// Create a frame with an explicit extended (29-bit) identifier
    pub fn extended(can_id: u32, data: &[u8]) -> Result<Self, FrameError> {
        if can_id > MAX_EXTENDED_ID {
            return Err(FrameError::IdOutOfRange(can_id));
        }
        Self::build(can_id, true, data)
    }

    fn build(can_id: u32, is_extended: bool, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() > MAX_DATA_LEN {
            return Err(FrameError::PayloadTooLong(data.len()));
        }
        Ok(Self {
            can_id,
            is_extended,
            data: data.to_vec(),
            timestamp: Utc::now(),
        })
    }

    /// Replace the receive timestamp (replayed logs carry their own)
    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Arbitration ID (11 or 29 bits, without flag bits)
    pub fn can_id(&self) -> u32 {
        self.can_id
    }

    pub fn is_extended(&self) -> bool {
        self.is_extended
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

impl fmt::Display for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_extended {
            write!(f, "{:08X}#", self.can_id)?;
        } else {
            write!(f, "{:03X}#", self.can_id)?;
        }
        for byte in &self.data {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// A decoded signal with its current value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedSignal {
    /// Signal name from the DBC
    pub name: String,
    /// Physical value (raw * factor + offset)
    pub value: SignalValue,
    /// Engineering unit (e.g., "%", "km/h", "V")
    pub unit: Option<String>,
    /// Value description from the DBC value table
    pub value_description: Option<String>,
    /// Raw value before scaling
    pub raw_value: i64,
}

/// Signal value types produced by the decoder
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// Unscaled integer value
    Integer(i64),
    /// Floating-point value (after scaling/offset)
    Float(f64),
    /// Single-bit flag
    Boolean(bool),
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Integer(v) => write!(f, "{}", v),
            SignalValue::Float(v) => write!(f, "{:.3}", v),
            SignalValue::Boolean(v) => write!(f, "{}", if *v { "true" } else { "false" }),
        }
    }
}

impl SignalValue {
    /// Numeric view of the value
    pub fn as_f64(&self) -> f64 {
        match self {
            SignalValue::Integer(v) => *v as f64,
            SignalValue::Float(v) => *v,
            SignalValue::Boolean(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Integer view of the value, truncating floats
    pub fn as_i64(&self) -> i64 {
        match self {
            SignalValue::Integer(v) => *v,
            SignalValue::Float(v) => *v as i64,
            SignalValue::Boolean(v) => i64::from(*v),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            SignalValue::Boolean(v) => *v,
            SignalValue::Integer(v) => *v != 0,
            SignalValue::Float(v) => *v != 0.0,
        }
    }
}
