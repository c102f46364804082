//! Error types for the Gate node.

use palisade_transport::TransportError;

/// Errors from session management and the client edge.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// No session under that id (expired, closed, or never existed).
    #[error("session {0} not found")]
    SessionNotFound(i64),

    /// The session exists but has no live conn to reply on.
    #[error("no conn bound to session {0}")]
    NoGateConnection(i64),

    /// The conn's outbound queue is full; non-blocking fast-fail.
    #[error("conn send queue full")]
    ConnBusy,

    /// The conn was already closed.
    #[error("conn closed")]
    ConnClosed,

    /// The Service pool shard's queue is full after all retries.
    #[error("service pool busy")]
    RemoteBusy,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
