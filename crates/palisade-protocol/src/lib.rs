//! Wire protocol for Palisade.
//!
//! This crate defines the language the three tiers speak:
//!
//! - **Envelope**: the framed wire unit and its binary/JSON encodings.
//! - **Message ids** ([`msgid`]) and the closed **routing table**
//!   ([`route_for`]).
//! - **Payload structs** ([`messages`]) and the payload [`Codec`].
//! - **Error codes** ([`ErrorCode`]) visible to clients.
//!
//! The protocol layer sits between transport (raw sockets) and the nodes
//! (session/player context). It knows nothing about connections, sessions,
//! or players, only bytes and ids.

mod codec;
mod envelope;
mod error;
pub mod messages;
pub mod msgid;
mod route;

pub use codec::{Codec, JsonCodec};
pub use envelope::{DEFAULT_MAX_ENVELOPE_SIZE, ENVELOPE_HEADER_LEN, Envelope};
pub use error::{ErrorCode, Platform, ProtocolError};
pub use route::{RouteRule, RouteTarget, is_gate_band, route_for};
