//! Envelope transports for Palisade.
//!
//! Provides the [`Conn`] trait (read/write one [`Envelope`] at a time)
//! and its two implementations:
//!
//! - [`FramedTcp`]: length-prefixed binary frames over TCP. Used on the
//!   client edge and on every inter-node link.
//! - [`WsConn`]: WebSocket messages, binary (wire form) or text (JSON
//!   form). Used on the client edge only.
//!
//! Both are safe to drive from two tasks at once: one reader, one writer.
//! Writes hold a per-connection lock so a frame is never interleaved with
//! another.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;
mod websocket;

pub use error::TransportError;
pub use tcp::FramedTcp;
pub use websocket::{WsConn, WsEncoding};

use std::time::Duration;

use palisade_protocol::Envelope;

/// Per-operation deadlines for a connection. `None` means no deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl ConnTimeouts {
    /// Builds timeouts from config seconds, where 0 means "none".
    pub fn from_secs(read_sec: u64, write_sec: u64) -> Self {
        let opt = |sec: u64| (sec > 0).then(|| Duration::from_secs(sec));
        Self {
            read: opt(read_sec),
            write: opt(write_sec),
        }
    }
}

/// A single live transport carrying envelopes.
pub trait Conn: Send + Sync + 'static {
    /// Reads the next envelope. [`TransportError::Closed`] on clean EOF.
    async fn read_envelope(&self) -> Result<Envelope, TransportError>;

    /// Writes one envelope as a single atomic frame.
    async fn write_envelope(&self, env: &Envelope) -> Result<(), TransportError>;

    /// Shuts the transport down. Safe to call more than once.
    async fn close(&self);
}
