//! Frame sources
//!
//! A frame source hands the dispatch loop one raw frame at a time. Each
//! receive blocks for at most the given timeout so the loop can check for
//! cancellation even on a silent bus.

use crate::error::TransportError;
use crate::types::RawFrame;
use std::time::Duration;

pub mod candump;
pub mod socket;

pub use candump::{parse_candump_line, CandumpSource};
pub use socket::SocketCanSource;

/// Outcome of one receive
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Frame(RawFrame),
    /// Nothing arrived within the timeout
    Timeout,
    /// A finite source (log replay) has no more frames
    EndOfStream,
}

/// Common interface for everything that produces raw frames
pub trait FrameSource {
    /// Wait up to `timeout` for the next frame
    ///
    /// An `Err` is a fatal transport failure; the loop stops on it.
    fn next_frame(&mut self, timeout: Duration) -> Result<SourceEvent, TransportError>;

    /// Release the underlying resource
    fn close(&mut self) {}

    /// Human readable name for logs (interface name, file path)
    fn describe(&self) -> String;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self, timeout: Duration) -> Result<SourceEvent, TransportError> {
        (**self).next_frame(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Scoped ownership of an open source
///
/// Releases the source exactly once: either through [`SourceGuard::release`]
/// or, on any other exit path including unwinding, on drop.
pub(crate) struct SourceGuard<S: FrameSource> {
    source: S,
    released: bool,
}

impl<S: FrameSource> SourceGuard<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    pub(crate) fn source(&mut self) -> &mut S {
        &mut self.source
    }

    pub(crate) fn release(&mut self) {
        if !self.released {
            self.released = true;
            log::debug!("Releasing frame source {}", self.source.describe());
            self.source.close();
        }
    }
}

impl<S: FrameSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Source backed by any iterator of frames
///
/// Never times out; reports end of stream when the iterator is exhausted.
pub struct IterSource<I> {
    frames: I,
    name: String,
}

impl<I> IterSource<I>
where
    I: Iterator<Item = RawFrame>,
{
    pub fn new<T: IntoIterator<IntoIter = I>>(frames: T, name: impl Into<String>) -> Self {
        Self {
            frames: frames.into_iter(),
            name: name.into(),
        }
    }
}

impl<I> FrameSource for IterSource<I>
where
    I: Iterator<Item = RawFrame>,
{
    fn next_frame(&mut self, _timeout: Duration) -> Result<SourceEvent, TransportError> {
        Ok(match self.frames.next() {
            Some(frame) => SourceEvent::Frame(frame),
            None => SourceEvent::EndOfStream,
        })
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
