//! Telemetry sinks
//!
//! A sink receives every decoded frame together with the latest-known state.
//! Sink failures are reported back to the dispatch loop, which logs them and
//! keeps reading.

use crate::decoder::DecodedFrame;
use crate::error::SinkError;
use crate::state::TelemetryState;
use crate::types::SignalValue;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod console;
pub mod json;

pub use console::{DashboardSink, LineSink};
pub use json::JsonLinesSink;

/// One publish call: the frame just decoded and the state after merging it
#[derive(Debug, Clone, Copy)]
pub struct TelemetryUpdate<'a> {
    pub frame: &'a DecodedFrame,
    pub state: &'a TelemetryState,
}

/// Consumer of decoded telemetry
pub trait TelemetrySink {
    fn publish(&mut self, update: &TelemetryUpdate<'_>) -> Result<(), SinkError>;

    /// Called once when the loop stops
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

impl<K: TelemetrySink + ?Sized> TelemetrySink for Box<K> {
    fn publish(&mut self, update: &TelemetryUpdate<'_>) -> Result<(), SinkError> {
        (**self).publish(update)
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        (**self).finish()
    }
}

/// Presentation settings shared by the text sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Signal name -> short label (e.g. "LBC_StateOfCharge" -> "SOC")
    #[serde(default)]
    pub labels: HashMap<String, String>,

    /// Decimal places for scaled values
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_precision() -> usize {
    1
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            labels: HashMap::new(),
            precision: default_precision(),
        }
    }
}

impl DisplayOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a display label
    pub fn with_label(mut self, signal: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(signal.into(), label.into());
        self
    }

    /// Builder method: set the decimal precision
    pub fn with_precision(mut self, precision: usize) -> Self {
        self.precision = precision;
        self
    }

    /// Label for a signal, falling back to the signal name
    pub fn label<'a>(&'a self, signal: &'a str) -> &'a str {
        self.labels.get(signal).map(String::as_str).unwrap_or(signal)
    }

    pub fn format_value(&self, value: &SignalValue) -> String {
        match value {
            SignalValue::Float(v) => format!("{:.*}", self.precision, v),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_and_precision() {
        let options = DisplayOptions::new()
            .with_label("LBC_StateOfCharge", "SOC")
            .with_precision(2);

        assert_eq!(options.label("LBC_StateOfCharge"), "SOC");
        assert_eq!(options.label("SOH"), "SOH");
        assert_eq!(options.format_value(&SignalValue::Float(50.0)), "50.00");
        assert_eq!(options.format_value(&SignalValue::Integer(281)), "281");
        assert_eq!(options.format_value(&SignalValue::Boolean(false)), "false");
    }
}
