//! candump log replay
//!
//! Reads the `candump -L` format produced by can-utils:
//!
//! ```text
//! (1436509052.249713) can0 55B#F401000000000000
//! (1436509052.250001) can0 18FEF100#0102
//! ```
//!
//! The leading timestamp and the interface name are optional. Remote frames
//! (`123#R`) are skipped, CAN FD lines (`123##...`) are rejected. Malformed
//! lines are logged and skipped rather than ending the replay.

use crate::error::{FrameError, TransportError};
use crate::source::{FrameSource, SourceEvent};
use crate::types::{RawFrame, Timestamp};
use chrono::DateTime;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::Duration;

/// Frame source replaying a candump log
pub struct CandumpSource<R: BufRead> {
    lines: Lines<R>,
    name: String,
    line_no: usize,
}

impl CandumpSource<BufReader<File>> {
    /// Open a candump log file
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        log::info!("Opening candump log: {:?}", path);
        let file = File::open(path).map_err(|error| TransportError::Open {
            endpoint: path.display().to_string(),
            error,
        })?;
        Ok(Self::from_reader(
            BufReader::new(file),
            path.display().to_string(),
        ))
    }
}

impl<R: BufRead> CandumpSource<R> {
    pub fn from_reader(reader: R, name: impl Into<String>) -> Self {
        Self {
            lines: reader.lines(),
            name: name.into(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> FrameSource for CandumpSource<R> {
    fn next_frame(&mut self, _timeout: Duration) -> Result<SourceEvent, TransportError> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(error)) => {
                    return Err(TransportError::Receive {
                        endpoint: self.name.clone(),
                        error,
                    })
                }
                None => return Ok(SourceEvent::EndOfStream),
            };
            self.line_no += 1;

            match parse_candump_line(&line) {
                Ok(Some(frame)) => return Ok(SourceEvent::Frame(frame)),
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("{}:{}: skipping line: {}", self.name, self.line_no, e);
                    continue;
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// Parse one candump line
///
/// Returns `Ok(None)` for blank lines, `#` comments and remote frames.
pub fn parse_candump_line(line: &str) -> Result<Option<RawFrame>, FrameError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let syntax = |reason: &str| FrameError::Syntax {
        text: line.to_string(),
        reason: reason.to_string(),
    };

    let mut timestamp = None;
    let mut frame_text = None;
    for token in line.split_whitespace() {
        if token.starts_with('(') {
            timestamp = Some(parse_timestamp(token).ok_or_else(|| syntax("bad timestamp"))?);
        } else if token.contains('#') {
            frame_text = Some(token);
            break;
        }
    }

    let frame_text = frame_text.ok_or_else(|| syntax("no ID#DATA field"))?;
    let frame = match parse_frame_text(frame_text)? {
        Some(frame) => frame,
        None => return Ok(None),
    };

    Ok(Some(match timestamp {
        Some(ts) => frame.with_timestamp(ts),
        None => frame,
    }))
}

/// Parse the `ID#DATA` notation used by candump and cansend
///
/// Three hex digits mean a standard ID, eight mean an extended ID.
pub fn parse_frame_text(text: &str) -> Result<Option<RawFrame>, FrameError> {
    let syntax = |reason: &str| FrameError::Syntax {
        text: text.to_string(),
        reason: reason.to_string(),
    };

    let (id_text, data_text) = text.split_once('#').ok_or_else(|| syntax("missing '#'"))?;

    if data_text.starts_with('#') {
        return Err(syntax("CAN FD frames are not supported"));
    }
    if data_text.starts_with('R') || data_text.starts_with('r') {
        return Ok(None);
    }

    if id_text.is_empty() || id_text.len() > 8 || !id_text.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(syntax("ID must be 1 to 8 hex digits"));
    }
    let can_id = u32::from_str_radix(id_text, 16).map_err(|_| syntax("ID is not hex"))?;

    let data_text: String = data_text.chars().filter(|c| *c != '.').collect();
    if !data_text.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(syntax("data is not hex"));
    }
    if data_text.len() % 2 != 0 {
        return Err(syntax("odd number of data digits"));
    }
    let data = (0..data_text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&data_text[i..i + 2], 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| syntax("data is not hex"))?;

    let frame = if id_text.len() > 3 {
        RawFrame::extended(can_id, &data)?
    } else {
        RawFrame::standard(can_id, &data)?
    };
    Ok(Some(frame))
}

fn parse_timestamp(token: &str) -> Option<Timestamp> {
    let inner = token.strip_prefix('(')?.strip_suffix(')')?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));
    let secs: i64 = secs.parse().ok()?;
    if frac.is_empty() || frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let nanos: u32 = format!("{:0<9}", frac).parse().ok()?;
    DateTime::from_timestamp(secs, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_full_line() {
        let frame = parse_candump_line("(1436509052.249713) can0 55B#F401000000000000")
            .unwrap()
            .unwrap();

        assert_eq!(frame.can_id(), 0x55B);
        assert!(!frame.is_extended());
        assert_eq!(frame.data(), &[0xF4, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(frame.timestamp().timestamp(), 1436509052);
        assert_eq!(frame.timestamp().timestamp_subsec_micros(), 249713);
    }

    #[test]
    fn test_parse_bare_and_extended() {
        let frame = parse_candump_line("18FEF100#0102").unwrap().unwrap();
        assert!(frame.is_extended());
        assert_eq!(frame.can_id(), 0x18FEF100);
        assert_eq!(frame.data(), &[1, 2]);

        let empty = parse_candump_line("can0 7DE#").unwrap().unwrap();
        assert_eq!(empty.dlc(), 0);
    }

    #[test]
    fn test_skipped_lines() {
        assert_eq!(parse_candump_line("").unwrap(), None);
        assert_eq!(parse_candump_line("# comment").unwrap(), None);
        assert_eq!(parse_candump_line("can0 123#R").unwrap(), None);
    }

    #[test]
    fn test_malformed_lines() {
        assert!(parse_candump_line("can0 55B").is_err());
        assert!(parse_candump_line("can0 55B#ABC").is_err());
        assert!(parse_candump_line("can0 XYZ#00").is_err());
        assert!(parse_candump_line("can0 +55#00").is_err());
        assert!(parse_frame_text("+1#00").is_err());
        assert!(parse_candump_line("can0 123##1AB").is_err());
        assert!(parse_candump_line("can0 800#00").is_err());
        assert!(parse_candump_line("can0 55B#000000000000000000").is_err());
        assert!(parse_candump_line("(abc) can0 55B#00").is_err());
    }

    #[test]
    fn test_replay_skips_bad_lines() {
        let log = "\
(1.000000) can0 55B#F401
garbage
(2.000000) can0 5B3#2003

";
        let mut source = CandumpSource::from_reader(Cursor::new(log), "test.log");
        let timeout = Duration::from_millis(10);

        match source.next_frame(timeout).unwrap() {
            SourceEvent::Frame(frame) => assert_eq!(frame.can_id(), 0x55B),
            other => panic!("unexpected {:?}", other),
        }
        match source.next_frame(timeout).unwrap() {
            SourceEvent::Frame(frame) => assert_eq!(frame.can_id(), 0x5B3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(source.next_frame(timeout).unwrap(), SourceEvent::EndOfStream);
    }

    #[test]
    fn test_open_missing_file() {
        let err = CandumpSource::open(Path::new("/nonexistent/capture.log"))
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Open { .. }));
    }
}
