//! Error types for the Service node.

use palisade_protocol::ProtocolError;
use palisade_store::StoreError;
use palisade_transport::TransportError;

/// Errors from dispatch, routing, and the module registry.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A module name registered twice. Startup-fatal.
    #[error("module {0} already registered")]
    DuplicateModule(String),

    /// Two modules claimed the same message id. Startup-fatal.
    #[error("msg id {msg_id} already registered by module {module}")]
    DuplicateHandler { msg_id: i32, module: String },

    /// A reply had no gate link to travel back on.
    #[error("no gate connection for session {0}")]
    NoGateConnection(i64),

    /// The game router's outbound queue is full.
    #[error("game router busy")]
    GameRouterBusy,

    /// The game link is down and reconnecting.
    #[error("game router not ready")]
    GameRouterNotReady,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
