//! SocketCAN frame source (Linux)
//!
//! Interface bring-up is the operator's job:
//!
//! ```text
//! sudo ip link set can0 up type can bitrate 500000
//! ```
//!
//! Only classic data frames are delivered; remote and error frames are
//! skipped. On other platforms opening the source fails with
//! [`TransportError::Unsupported`].

use crate::error::TransportError;
use crate::source::{FrameSource, SourceEvent};
use crate::types::RawFrame;
use std::time::Duration;

#[cfg(target_os = "linux")]
pub use self::linux::{send_frame, SocketCanSource};

#[cfg(not(target_os = "linux"))]
pub use self::unsupported::{send_frame, SocketCanSource};

/// Map an incoming classic frame to a [`RawFrame`], `None` for non-data frames
#[cfg(target_os = "linux")]
fn convert_frame(frame: &::socketcan::CanFrame) -> Option<RawFrame> {
    use embedded_can::{Frame as EmbeddedFrame, Id};

    match frame {
        ::socketcan::CanFrame::Data(data_frame) => {
            let result = match data_frame.id() {
                Id::Standard(id) => RawFrame::standard(u32::from(id.as_raw()), data_frame.data()),
                Id::Extended(id) => RawFrame::extended(id.as_raw(), data_frame.data()),
            };
            match result {
                Ok(raw) => Some(raw),
                Err(e) => {
                    log::warn!("Dropping frame from socket: {}", e);
                    None
                }
            }
        }
        ::socketcan::CanFrame::Remote(_) => {
            log::trace!("Skipping remote frame");
            None
        }
        ::socketcan::CanFrame::Error(_) => {
            log::debug!("Skipping CAN error frame");
            None
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::*;
    use embedded_can::{ExtendedId, Frame as EmbeddedFrame, StandardId};
    use socketcan::{CanFrame, CanSocket, Socket};
    use std::io;

    /// Frame source reading a SocketCAN interface
    pub struct SocketCanSource {
        socket: Option<CanSocket>,
        interface: String,
    }

    impl SocketCanSource {
        /// Open a raw CAN socket on `interface` (e.g. "can0")
        pub fn open(interface: &str) -> Result<Self, TransportError> {
            let socket = CanSocket::open(interface).map_err(|error| TransportError::Open {
                endpoint: interface.to_string(),
                error,
            })?;
            log::info!("Connected to {}", interface);
            Ok(Self {
                socket: Some(socket),
                interface: interface.to_string(),
            })
        }
    }

    impl FrameSource for SocketCanSource {
        fn next_frame(&mut self, timeout: Duration) -> Result<SourceEvent, TransportError> {
            let socket = self.socket.as_ref().ok_or_else(|| TransportError::Receive {
                endpoint: self.interface.clone(),
                error: io::Error::new(io::ErrorKind::NotConnected, "socket already closed"),
            })?;

            match socket.read_frame_timeout(timeout) {
                Ok(frame) => Ok(match convert_frame(&frame) {
                    Some(raw) => SourceEvent::Frame(raw),
                    None => SourceEvent::Timeout,
                }),
                // EINTR shows up when Ctrl-C lands during the wait
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::TimedOut
                            | io::ErrorKind::WouldBlock
                            | io::ErrorKind::Interrupted
                    ) =>
                {
                    Ok(SourceEvent::Timeout)
                }
                Err(error) => Err(TransportError::Receive {
                    endpoint: self.interface.clone(),
                    error,
                }),
            }
        }

        fn close(&mut self) {
            if self.socket.take().is_some() {
                log::info!("Closed {}", self.interface);
            }
        }

        fn describe(&self) -> String {
            self.interface.clone()
        }
    }

    /// Transmit a single frame on `interface`
    pub fn send_frame(interface: &str, frame: &RawFrame) -> Result<(), TransportError> {
        let invalid = |reason: &str| TransportError::InvalidFrame {
            endpoint: interface.to_string(),
            reason: reason.to_string(),
        };

        let can_frame = if frame.is_extended() {
            let id = ExtendedId::new(frame.can_id()).ok_or_else(|| invalid("bad extended ID"))?;
            CanFrame::new(id, frame.data())
        } else {
            let id = u16::try_from(frame.can_id())
                .ok()
                .and_then(StandardId::new)
                .ok_or_else(|| invalid("bad standard ID"))?;
            CanFrame::new(id, frame.data())
        };
        let can_frame = can_frame.ok_or_else(|| invalid("payload too long"))?;

        let socket = CanSocket::open(interface).map_err(|error| TransportError::Open {
            endpoint: interface.to_string(),
            error,
        })?;
        socket
            .write_frame(&can_frame)
            .map_err(|error| TransportError::Transmit {
                endpoint: interface.to_string(),
                error,
            })?;

        log::info!("Sent {} on {}", frame, interface);
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod unsupported {
    use super::*;

    /// Placeholder on platforms without SocketCAN; opening always fails
    pub struct SocketCanSource {
        interface: String,
    }

    impl SocketCanSource {
        pub fn open(_interface: &str) -> Result<Self, TransportError> {
            Err(TransportError::Unsupported("SocketCAN".to_string()))
        }
    }

    impl FrameSource for SocketCanSource {
        fn next_frame(&mut self, _timeout: Duration) -> Result<SourceEvent, TransportError> {
            Err(TransportError::Unsupported("SocketCAN".to_string()))
        }

        fn describe(&self) -> String {
            self.interface.clone()
        }
    }

    pub fn send_frame(_interface: &str, _frame: &RawFrame) -> Result<(), TransportError> {
        Err(TransportError::Unsupported("SocketCAN".to_string()))
    }
}
