//! The Game node: stateful per-player logic for Palisade.
//!
//! Each live player is an actor: one bounded mailbox, one worker, a
//! static slice of business [`modules`]. The [`PlayerManager`] owns every
//! actor and the session index; [`GameServer`] is the node's TCP face
//! toward the Service tier.
//!
//! ```text
//! Service ──envelopes──→ GameServer ──→ PlayerManager ──→ Player actor
//!                                                           │ inbox
//!                                                           ▼
//!                                                        modules
//! ```

mod error;
mod manager;
mod module;
pub mod modules;
mod player;
mod server;

pub use error::GameError;
pub use manager::{ModuleFactory, PlayerManager};
pub use module::{ModuleOutcome, PlayerCtx, PlayerModule};
pub use player::{DISPATCH_TIMEOUT, INBOX_CAPACITY, Player, PlayerState};
pub use server::{GameConfig, GameServer};
