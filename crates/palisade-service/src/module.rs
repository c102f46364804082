//! The service module interface.

use async_trait::async_trait;

use crate::context::ServiceContext;
use crate::ServiceError;

/// A business capability on the Service tier (login, chat, ...).
///
/// A module claims a fixed set of message ids at registration; the
/// [`Registry`](crate::Registry) refuses overlaps at startup rather than
/// letting two modules race for an id in production.
#[async_trait]
pub trait ServiceModule: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-shot setup at registration. Failing here aborts startup.
    fn init(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    /// The message ids this module handles.
    fn msg_ids(&self) -> Vec<i32>;

    /// Handles one envelope. Runs on a session shard worker: serial for
    /// any one session, parallel across shards.
    async fn handle(&self, ctx: &mut ServiceContext) -> Result<(), ServiceError>;
}
