//! JSON lines sink
//!
//! Writes one JSON object per decoded frame, suitable for piping into a log
//! collector or a network forwarder.

use crate::error::SinkError;
use crate::sink::{TelemetrySink, TelemetryUpdate};
use crate::types::{SignalValue, Timestamp};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Stdout, Write};

#[derive(Serialize)]
struct FrameRecord<'a> {
    timestamp: Timestamp,
    can_id: u32,
    message: &'a str,
    signals: BTreeMap<&'a str, SignalRecord<'a>>,
}

#[derive(Serialize)]
struct SignalRecord<'a> {
    value: &'a SignalValue,
    raw: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Newline-delimited JSON writer
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl JsonLinesSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for JsonLinesSink<W> {
    fn publish(&mut self, update: &TelemetryUpdate<'_>) -> Result<(), SinkError> {
        let frame = update.frame;
        let record = FrameRecord {
            timestamp: frame.timestamp,
            can_id: frame.can_id,
            message: &frame.message_name,
            signals: frame
                .signals
                .iter()
                .map(|s| {
                    (
                        s.name.as_str(),
                        SignalRecord {
                            value: &s.value,
                            raw: s.raw_value,
                            unit: s.unit.as_deref(),
                            description: s.value_description.as_deref(),
                        },
                    )
                })
                .collect(),
        };

        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
