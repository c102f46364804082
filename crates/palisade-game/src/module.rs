//! Player modules: the business capabilities attached to each actor.
//!
//! A module owns one slice of a player's behavior (profile queries, bag,
//! quests, ...). Modules are listed statically per build and walked in
//! registration order; the first one that claims a message id handles it.
//!
//! Handlers run on the player's single worker, so a module needs no
//! internal locking; `&mut self` is exclusive by construction.

use std::sync::{Arc, Mutex};

use palisade_protocol::Envelope;
use palisade_store::PlayerProfile;

use crate::GameError;

/// What a module sees of its player while handling a message.
#[derive(Clone)]
pub struct PlayerCtx {
    pub player_id: i64,
    /// Session currently bound at the Gate; updated on resume.
    pub session_id: i64,
    /// The profile snapshot this actor owns. Only the player's worker
    /// mutates it; the manager takes read snapshots for persistence.
    pub profile: Arc<Mutex<PlayerProfile>>,
}

impl PlayerCtx {
    /// Clones the current profile state.
    pub fn profile_snapshot(&self) -> PlayerProfile {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Result of offering an envelope to a module.
pub enum ModuleOutcome {
    /// The module consumed the message; walking stops. The optional
    /// envelope is the reply.
    Handled(Option<Envelope>),
    /// Not this module's message after all; the walk continues.
    Pass,
}

/// A capability set attached to every player actor.
pub trait PlayerModule: Send + 'static {
    fn name(&self) -> &'static str;

    /// Called once when the actor is created.
    fn init(&mut self, ctx: &PlayerCtx) -> Result<(), GameError> {
        let _ = ctx;
        Ok(())
    }

    /// Fast routing check; `handle` is only called when this is true.
    fn can_handle(&self, msg_id: i32) -> bool;

    /// Handles one envelope on the player's worker.
    fn handle(&mut self, ctx: &PlayerCtx, env: &Envelope) -> Result<ModuleOutcome, GameError>;

    /// The player reattached from a new connection.
    fn on_resume(&mut self, ctx: &PlayerCtx) {
        let _ = ctx;
    }

    /// The Gate reported the player's connection gone. The actor stays
    /// alive for a possible resume.
    fn on_offline(&mut self, ctx: &PlayerCtx) {
        let _ = ctx;
    }
}
