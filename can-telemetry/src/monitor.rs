//! Dispatch loop
//!
//! Pulls frames from a [`FrameSource`], routes them through the decoder,
//! merges the results into the latest-known state and publishes them to a
//! [`TelemetrySink`].
//!
//! ```text
//! Starting -> Listening -> Decoding -> Updating -> Listening -> ... -> Stopped
//! ```
//!
//! Only transport failures end the loop with an error. Unknown IDs, decode
//! errors and sink errors are logged and counted, then the loop moves on to
//! the next frame. The source is released exactly once on every exit path.

use crate::config::MonitorConfig;
use crate::decoder::{decode, Decoded};
use crate::error::{MonitorError, TransportError};
use crate::schema::MessageSchema;
use crate::sink::{TelemetrySink, TelemetryUpdate};
use crate::source::{FrameSource, SourceEvent, SourceGuard};
use crate::state::TelemetryState;
use crate::types::RawFrame;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked between receives
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Loop phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    Starting,
    Listening,
    Decoding,
    Updating,
    Stopped,
}

/// Why a loop ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancel token was set
    Cancelled,
    /// A finite source ran out of frames
    EndOfStream,
    /// The configured frame budget was used up
    FrameLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::FrameLimit => write!(f, "frame limit reached"),
        }
    }
}

/// What happened to a single frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// ID not in the watch-set
    Ignored,
    /// ID not in the schema
    Unknown,
    /// Nothing left to publish (every signal failed or was filtered out)
    Dropped { errors: usize },
    /// Merged into the state and handed to the sink
    Published { signals: usize, errors: usize },
}

/// Counters kept over one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub frames_received: usize,
    pub frames_published: usize,
    pub frames_ignored: usize,
    pub decode_errors: usize,
    pub sink_errors: usize,
    pub timeouts: usize,
}

/// The dispatch loop and the state it owns
pub struct Monitor<'a> {
    schema: &'a MessageSchema,
    config: MonitorConfig,
    state: TelemetryState,
    phase: MonitorPhase,
    stats: MonitorStats,
}

impl<'a> Monitor<'a> {
    pub fn new(schema: &'a MessageSchema, config: MonitorConfig) -> Self {
        if let Some(ids) = &config.watch_ids {
            for id in ids.iter().filter(|id| !schema.contains(**id)) {
                log::warn!("Watched ID 0x{:X} is not defined in the schema", id);
            }
        }
        if let Some(signals) = &config.signal_filter {
            for name in signals.iter().filter(|s| schema.find_signal(s).is_none()) {
                log::warn!("Signal '{}' is not defined in the schema", name);
            }
        }

        Self {
            schema,
            config,
            state: TelemetryState::new(),
            phase: MonitorPhase::Starting,
            stats: MonitorStats::default(),
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn state(&self) -> &TelemetryState {
        &self.state
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Run the loop until cancellation, end of stream, frame limit or a
    /// fatal transport error
    ///
    /// `open` acquires the frame source. The source is released before this
    /// function returns, whichever way it returns.
    pub fn run<S, F, K>(
        &mut self,
        open: F,
        sink: &mut K,
        cancel: &CancelToken,
    ) -> Result<StopReason, MonitorError>
    where
        S: FrameSource,
        F: FnOnce() -> Result<S, TransportError>,
        K: TelemetrySink + ?Sized,
    {
        self.transition(MonitorPhase::Starting);

        let source = match open() {
            Ok(source) => source,
            Err(e) => {
                log::error!("Frame source unavailable: {}", e);
                self.transition(MonitorPhase::Stopped);
                return Err(e.into());
            }
        };

        let mut guard = SourceGuard::new(source);
        log::info!("Listening on {}", guard.source().describe());

        let result = self.listen(&mut guard, sink, cancel);

        guard.release();
        if let Err(e) = sink.finish() {
            log::warn!("Telemetry sink failed to finish: {}", e);
        }
        self.transition(MonitorPhase::Stopped);

        match &result {
            Ok(reason) => log::info!("Stopped: {}", reason),
            Err(e) => log::error!("Stopped on fatal error: {}", e),
        }
        log::info!(
            "Frames received: {}, published: {}, ignored: {}, decode errors: {}, sink errors: {}",
            self.stats.frames_received,
            self.stats.frames_published,
            self.stats.frames_ignored,
            self.stats.decode_errors,
            self.stats.sink_errors
        );

        result
    }

    fn listen<S, K>(
        &mut self,
        guard: &mut SourceGuard<S>,
        sink: &mut K,
        cancel: &CancelToken,
    ) -> Result<StopReason, MonitorError>
    where
        S: FrameSource,
        K: TelemetrySink + ?Sized,
    {
        let timeout = self.config.receive_timeout();
        self.transition(MonitorPhase::Listening);

        loop {
            if cancel.is_cancelled() {
                return Ok(StopReason::Cancelled);
            }
            if let Some(max) = self.config.max_frames {
                if self.stats.frames_received >= max {
                    return Ok(StopReason::FrameLimit);
                }
            }

            match guard.source().next_frame(timeout)? {
                SourceEvent::Frame(frame) => {
                    self.process_frame(&frame, sink);
                }
                SourceEvent::Timeout => self.stats.timeouts += 1,
                SourceEvent::EndOfStream => return Ok(StopReason::EndOfStream),
            }
        }
    }

    /// Decode one frame, merge it into the state and publish it
    ///
    /// Never fails: problems with the frame or the sink are logged, counted
    /// and reported through the returned outcome.
    pub fn process_frame<K>(&mut self, frame: &RawFrame, sink: &mut K) -> FrameOutcome
    where
        K: TelemetrySink + ?Sized,
    {
        self.stats.frames_received += 1;

        let outcome = self.handle_frame(frame, sink);
        if matches!(outcome, FrameOutcome::Ignored | FrameOutcome::Unknown) {
            self.stats.frames_ignored += 1;
        }

        self.transition(MonitorPhase::Listening);
        outcome
    }

    fn handle_frame<K>(&mut self, frame: &RawFrame, sink: &mut K) -> FrameOutcome
    where
        K: TelemetrySink + ?Sized,
    {
        let can_id = frame.can_id();
        if !self.config.is_watched(can_id) {
            log::trace!("Ignoring unwatched ID 0x{:X}", can_id);
            return FrameOutcome::Ignored;
        }

        self.transition(MonitorPhase::Decoding);
        let mut decoded = match decode(frame, self.schema) {
            Decoded::Message(decoded) => decoded,
            Decoded::Unknown => {
                log::trace!("No schema for ID 0x{:X}", can_id);
                return FrameOutcome::Unknown;
            }
        };

        let errors = decoded.errors.len();
        for e in &decoded.errors {
            log::warn!("Error decoding message 0x{:X}: {}", can_id, e);
        }
        self.stats.decode_errors += errors;

        let config = &self.config;
        decoded.retain_signals(|name| config.wants_signal(name));
        if decoded.signals.is_empty() {
            return FrameOutcome::Dropped { errors };
        }

        log::debug!(
            "Decoded {} (0x{:X}): {} signals",
            decoded.message_name,
            can_id,
            decoded.signals.len()
        );

        self.transition(MonitorPhase::Updating);
        self.state.apply(&decoded);
        self.stats.frames_published += 1;

        let update = TelemetryUpdate {
            frame: &decoded,
            state: &self.state,
        };
        if let Err(e) = sink.publish(&update) {
            log::warn!("Telemetry sink rejected 0x{:X}: {}", can_id, e);
            self.stats.sink_errors += 1;
        }

        FrameOutcome::Published {
            signals: decoded.signals.len(),
            errors,
        }
    }

    fn transition(&mut self, next: MonitorPhase) {
        if self.phase != next {
            log::trace!("{:?} -> {:?}", self.phase, next);
            self.phase = next;
        }
    }
}
