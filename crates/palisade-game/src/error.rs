//! Error types for the Game node.

use palisade_store::StoreError;
use palisade_transport::TransportError;

/// Errors from player actors and the Game node.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The player's inbox is full; backpressure signal to the caller.
    #[error("player inbox full")]
    PlayerBusy,

    /// The player is offline and not accepting messages.
    #[error("player offline")]
    PlayerOffline,

    /// The player actor was destroyed; pending and future messages fail.
    #[error("player destroyed")]
    PlayerDestroyed,

    /// A request/reply dispatch waited past its deadline.
    #[error("player reply timed out")]
    PlayerReplyTimeout,

    /// No live player for the given id.
    #[error("player {0} not found")]
    PlayerNotFound(i64),

    /// A module panicked while handling an envelope. The worker survives;
    /// this is the terminal reply for that one message.
    #[error("module {module} panicked handling msg {msg_id}")]
    HandlerPanic { module: &'static str, msg_id: i32 },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
