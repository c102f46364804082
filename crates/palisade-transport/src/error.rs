//! Error types for the transport layer.

use palisade_protocol::ProtocolError;

/// Errors from reading or writing envelopes on a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer closed the connection (clean EOF or close frame).
    #[error("connection closed")]
    Closed,

    /// A frame length exceeding the configured cap. The connection is
    /// unusable afterwards: the stream position is inside the oversized
    /// frame.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// A read deadline elapsed.
    #[error("read timed out")]
    ReadTimeout,

    /// A write deadline elapsed.
    #[error("write timed out")]
    WriteTimeout,

    /// Socket-level failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure.
    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// The bytes on the wire were not a valid envelope.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl TransportError {
    /// Transient transport failures: the session survives, the conn does
    /// not.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::Closed
                | TransportError::Io(_)
                | TransportError::Ws(_)
                | TransportError::ReadTimeout
                | TransportError::WriteTimeout
        )
    }
}
