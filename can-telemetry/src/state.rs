//! Latest-known signal values
//!
//! Owned by the dispatch loop and overwritten in place as frames decode.
//! A signal that has never been observed reads as unknown; callers that want
//! the old dashboard behaviour can ask for a default instead.

use crate::decoder::DecodedFrame;
use crate::types::{SignalValue, Timestamp};
use std::collections::BTreeMap;

/// Most recent reading of one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SignalReading {
    pub value: SignalValue,
    pub unit: Option<String>,
    pub value_description: Option<String>,
    /// CAN ID of the frame the reading came from
    pub can_id: u32,
    pub updated_at: Timestamp,
}

/// Signal name -> latest reading
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryState {
    readings: BTreeMap<String, SignalReading>,
}

impl TelemetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge every signal of a decoded frame into the state
    pub fn apply(&mut self, frame: &DecodedFrame) {
        for signal in &frame.signals {
            let reading = SignalReading {
                value: signal.value.clone(),
                unit: signal.unit.clone(),
                value_description: signal.value_description.clone(),
                can_id: frame.can_id,
                updated_at: frame.timestamp,
            };
            self.readings.insert(signal.name.clone(), reading);
        }
    }

    /// Latest reading of a signal, `None` until first observed
    pub fn get(&self, name: &str) -> Option<&SignalReading> {
        self.readings.get(name)
    }

    /// Latest physical value of a signal
    pub fn value(&self, name: &str) -> Option<f64> {
        self.get(name).map(|r| r.value.as_f64())
    }

    /// Latest physical value, or `default` if the signal is still unknown
    pub fn value_or(&self, name: &str, default: f64) -> f64 {
        self.value(name).unwrap_or(default)
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.readings.contains_key(name)
    }

    /// Iterate readings in signal name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalReading)> {
        self.readings.iter().map(|(name, reading)| (name.as_str(), reading))
    }

    /// Plain name -> value copy of the state
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.readings
            .iter()
            .map(|(name, reading)| (name.clone(), reading.value.as_f64()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
