//! The Service node: stateless business logic for Palisade.
//!
//! ```text
//! Gate links ──→ NetServer ──shard workers──→ Dispatcher ──→ modules
//!                    │                                         │
//!                    └──────────── GameRouter ←── send_to_game ┘
//! ```
//!
//! The [`NetServer`] accepts Gate links and shards envelopes by session;
//! the [`Dispatcher`] runs the [`Registry`]'s module for each message id
//! with panic isolation; the [`GameRouter`] owns the single persistent
//! link to the Game node.

mod context;
mod dispatcher;
mod error;
mod game_router;
mod module;
pub mod modules;
mod netserver;
mod registry;

pub use context::ServiceContext;
pub use dispatcher::Dispatcher;
pub use error::ServiceError;
pub use game_router::GameRouter;
pub use module::ServiceModule;
pub use netserver::{NetServer, ServiceConfig};
pub use registry::Registry;
