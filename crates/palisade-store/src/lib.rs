//! Player persistence for Palisade.
//!
//! The concrete store (Redis in production) lives outside this repo; here
//! are the pieces every node agrees on:
//!
//! 1. **Profile shape** ([`PlayerProfile`]) and its JSON encoding.
//! 2. **Key layout** ([`account_role_key`], [`player_profile_key`],
//!    [`UID_NEXT_KEY`]).
//! 3. **The [`PlayerStore`] trait**: load/save per key plus monotonic
//!    [`next_uid`](PlayerStore::next_uid).
//! 4. **[`MemoryStore`]**: the in-process implementation for tests and
//!    development.

mod error;
mod memory;
mod profile;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use profile::PlayerProfile;
pub use store::{PlayerStore, UID_NEXT_KEY, account_role_key, player_profile_key};
