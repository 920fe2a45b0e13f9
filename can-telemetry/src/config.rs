//! Dispatch loop configuration
//!
//! Which message IDs and signals the loop cares about, how long a single
//! receive may block, and an optional frame budget. Vehicle-specific IDs and
//! signal names live here (or in the CLI config file), never in the decoder.

use std::time::Duration;

/// Configuration for the dispatch loop
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Optional: only decode these CAN message IDs (the watch-set)
    pub watch_ids: Option<Vec<u32>>,

    /// Optional: only publish these signal names
    pub signal_filter: Option<Vec<String>>,

    /// Upper bound for one blocking receive, in milliseconds
    pub receive_timeout_ms: u64,

    /// Optional: stop after this many received frames
    pub max_frames: Option<usize>,
}

/// Receive timeout when none is configured
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 250;

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_ids: None,
            signal_filter: None,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            max_frames: None,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the watch-set
    pub fn with_watch_ids(mut self, ids: Vec<u32>) -> Self {
        self.watch_ids = Some(ids);
        self
    }

    /// Builder method: set the signal filter
    pub fn with_signal_filter<S: Into<String>>(mut self, signals: Vec<S>) -> Self {
        self.signal_filter = Some(signals.into_iter().map(Into::into).collect());
        self
    }

    /// Builder method: set the receive timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Builder method: stop after a number of frames
    pub fn with_max_frames(mut self, max_frames: usize) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Check if a message ID is in the watch-set
    pub fn is_watched(&self, can_id: u32) -> bool {
        match &self.watch_ids {
            Some(ids) => ids.contains(&can_id),
            None => true,
        }
    }

    /// Check if a signal should be published
    pub fn wants_signal(&self, name: &str) -> bool {
        match &self.signal_filter {
            Some(signals) => signals.iter().any(|s| s == name),
            None => true,
        }
    }
}
