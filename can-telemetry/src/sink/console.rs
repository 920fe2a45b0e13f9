//! Text sinks for a terminal
//!
//! [`LineSink`] prints one line per decoded signal. [`DashboardSink`] keeps a
//! single status line that is redrawn in place with the latest value of each
//! column.

use crate::error::SinkError;
use crate::sink::{DisplayOptions, TelemetrySink, TelemetryUpdate};
use crate::state::SignalReading;
use std::io::{self, Stdout, Write};

fn with_unit(value: String, unit: Option<&str>) -> String {
    match unit {
        None | Some("") => value,
        Some("%") => format!("{}%", value),
        Some(unit) => format!("{} {}", value, unit),
    }
}

/// One line per decoded signal
pub struct LineSink<W: Write> {
    writer: W,
    options: DisplayOptions,
}

impl LineSink<Stdout> {
    pub fn stdout(options: DisplayOptions) -> Self {
        Self::new(io::stdout(), options)
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W, options: DisplayOptions) -> Self {
        Self { writer, options }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TelemetrySink for LineSink<W> {
    fn publish(&mut self, update: &TelemetryUpdate<'_>) -> Result<(), SinkError> {
        for signal in &update.frame.signals {
            let value = with_unit(
                self.options.format_value(&signal.value),
                signal.unit.as_deref(),
            );
            match &signal.value_description {
                Some(description) => writeln!(
                    self.writer,
                    "Received {}: {} ({})",
                    self.options.label(&signal.name),
                    value,
                    description
                )?,
                None => writeln!(
                    self.writer,
                    "Received {}: {}",
                    self.options.label(&signal.name),
                    value
                )?,
            }
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Single status line, redrawn with a carriage return on every update
pub struct DashboardSink<W: Write> {
    writer: W,
    options: DisplayOptions,
    /// Signals shown, in order. Empty means every known signal.
    columns: Vec<String>,
    drawn: bool,
}

impl DashboardSink<Stdout> {
    pub fn stdout(columns: Vec<String>, options: DisplayOptions) -> Self {
        Self::new(io::stdout(), columns, options)
    }
}

impl<W: Write> DashboardSink<W> {
    pub fn new(writer: W, columns: Vec<String>, options: DisplayOptions) -> Self {
        Self {
            writer,
            options,
            columns,
            drawn: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn cell(&self, name: &str, reading: Option<&SignalReading>) -> String {
        let value = match reading {
            Some(r) => with_unit(self.options.format_value(&r.value), r.unit.as_deref()),
            None => "--".to_string(),
        };
        format!("{}: {}", self.options.label(name), value)
    }
}

impl<W: Write> TelemetrySink for DashboardSink<W> {
    fn publish(&mut self, update: &TelemetryUpdate<'_>) -> Result<(), SinkError> {
        let cells: Vec<String> = if self.columns.is_empty() {
            update
                .state
                .iter()
                .map(|(name, reading)| self.cell(name, Some(reading)))
                .collect()
        } else {
            self.columns
                .iter()
                .map(|name| self.cell(name, update.state.get(name)))
                .collect()
        };

        write!(self.writer, "\r{}    ", cells.join("   "))?;
        self.writer.flush()?;
        self.drawn = true;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if self.drawn {
            writeln!(self.writer)?;
            self.writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DecodedFrame;
    use crate::state::TelemetryState;
    use crate::types::{DecodedSignal, SignalValue};
    use chrono::Utc;

    fn frame(name: &str, value: SignalValue, unit: Option<&str>) -> DecodedFrame {
        DecodedFrame {
            can_id: 0x5B3,
            message_name: "LBC_Health".to_string(),
            timestamp: Utc::now(),
            signals: vec![DecodedSignal {
                name: name.to_string(),
                value,
                unit: unit.map(str::to_string),
                value_description: None,
                raw_value: 0,
            }],
            errors: Vec::new(),
            multiplexer_value: None,
        }
    }

    #[test]
    fn test_line_sink_output() {
        let options = DisplayOptions::new().with_label("LBC_StateOfCharge", "LBC SOC");
        let mut sink = LineSink::new(Vec::new(), options);

        let soc = frame("LBC_StateOfCharge", SignalValue::Float(50.0), Some("%"));
        let state = TelemetryState::new();
        sink.publish(&TelemetryUpdate {
            frame: &soc,
            state: &state,
        })
        .unwrap();

        let speed = frame("VehicleSpeedCluster", SignalValue::Float(31.26), Some("mph"));
        sink.publish(&TelemetryUpdate {
            frame: &speed,
            state: &state,
        })
        .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "Received LBC SOC: 50.0%\nReceived VehicleSpeedCluster: 31.3 mph\n"
        );
    }

    #[test]
    fn test_dashboard_shows_unknown_columns() {
        let options = DisplayOptions::new()
            .with_label("BatteryStateOfHealth", "SOH")
            .with_label("BatteryGIDS", "Gids");
        let columns = vec!["BatteryStateOfHealth".to_string(), "BatteryGIDS".to_string()];
        let mut sink = DashboardSink::new(Vec::new(), columns, options);

        let soh = frame("BatteryStateOfHealth", SignalValue::Float(80.0), Some("%"));
        let mut state = TelemetryState::new();
        state.apply(&soh);

        sink.publish(&TelemetryUpdate {
            frame: &soh,
            state: &state,
        })
        .unwrap();
        sink.finish().unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "\rSOH: 80.0%   Gids: --    \n");
    }

    #[test]
    fn test_dashboard_finish_without_output() {
        let mut sink = DashboardSink::new(Vec::new(), Vec::new(), DisplayOptions::new());
        sink.finish().unwrap();
        assert!(sink.into_inner().is_empty());
    }
}
