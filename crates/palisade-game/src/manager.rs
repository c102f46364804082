//! The player manager: every live actor on this Game node.
//!
//! Two indices under one lock: `players` (player id → actor) and
//! `sessions` (gate session id → player id). All lifecycle transitions go
//! through the manager; nothing else creates or destroys actors.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use palisade_store::{PlayerProfile, PlayerStore};
use tokio_util::sync::CancellationToken;

use crate::module::PlayerModule;
use crate::player::{Player, PlayerState};
use crate::GameError;

/// Builds the module slice for a freshly created actor. Static per build.
pub type ModuleFactory = fn() -> Vec<Box<dyn PlayerModule>>;

#[derive(Default)]
struct Indices {
    players: HashMap<i64, Arc<Player>>,
    sessions: HashMap<i64, i64>,
}

pub struct PlayerManager {
    indices: RwLock<Indices>,
    store: Arc<dyn PlayerStore>,
    modules: ModuleFactory,
}

impl PlayerManager {
    pub fn new(store: Arc<dyn PlayerStore>, modules: ModuleFactory) -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            store,
            modules,
        }
    }

    /// Returns the live actor for `player_id`, resuming it onto
    /// `session_id`; or loads (creating on first contact) the profile and
    /// spawns a fresh actor.
    pub async fn get_or_create(
        &self,
        session_id: i64,
        player_id: i64,
    ) -> Result<Arc<Player>, GameError> {
        if let Some(existing) = self.get(player_id) {
            existing.resume(session_id).await?;
            self.rebind_session(session_id, player_id);
            return Ok(existing);
        }

        let profile = match self.store.load_profile(player_id).await? {
            Some(profile) => profile,
            None => {
                // First contact: persist the fresh profile immediately so
                // a crash before the next tick doesn't lose the role.
                let profile = PlayerProfile::new(player_id, "");
                self.store.save_profile(&profile).await?;
                profile
            }
        };

        // A concurrent enter-game for the same player may have won the
        // race while we were loading; their actor is authoritative.
        let raced = {
            let guard = self.indices.write().unwrap_or_else(|e| e.into_inner());
            guard.players.get(&player_id).cloned()
        };
        if let Some(existing) = raced {
            existing.resume(session_id).await?;
            self.rebind_session(session_id, player_id);
            return Ok(existing);
        }

        let player = Player::spawn(player_id, session_id, profile, (self.modules)())?;
        {
            let mut guard = self.indices.write().unwrap_or_else(|e| e.into_inner());
            guard.players.insert(player_id, Arc::clone(&player));
            guard.sessions.insert(session_id, player_id);
        }

        tracing::info!(player = player_id, session = session_id, "player created");
        Ok(player)
    }

    /// Resume an existing player onto a new session; creates the actor if
    /// this node lost it (e.g. after a restart).
    pub async fn resume_player(
        &self,
        session_id: i64,
        player_id: i64,
    ) -> Result<Arc<Player>, GameError> {
        self.get_or_create(session_id, player_id).await
    }

    /// The Gate reported the player gone: persist the profile, take the
    /// actor offline, and unbind the session. The actor stays indexed so
    /// a resume finds it.
    pub async fn mark_offline(&self, player_id: i64) -> Result<(), GameError> {
        let Some(player) = self.get(player_id) else {
            return Err(GameError::PlayerNotFound(player_id));
        };

        self.store.save_profile(&player.profile_snapshot()).await?;
        player.offline().await?;

        let mut guard = self.indices.write().unwrap_or_else(|e| e.into_inner());
        guard.sessions.remove(&player.session_id());
        Ok(())
    }

    /// Full teardown (kick, shutdown, storage eviction). Pending dispatches
    /// fail with `PlayerDestroyed`.
    pub async fn destroy_player(&self, player_id: i64) -> Result<(), GameError> {
        let player = {
            let mut guard = self.indices.write().unwrap_or_else(|e| e.into_inner());
            let player = guard.players.remove(&player_id);
            if let Some(p) = &player {
                guard.sessions.remove(&p.session_id());
            }
            player
        };

        let Some(player) = player else {
            return Err(GameError::PlayerNotFound(player_id));
        };
        self.store.save_profile(&player.profile_snapshot()).await?;
        player.destroy().await;
        tracing::info!(player = player_id, "player destroyed");
        Ok(())
    }

    pub fn get(&self, player_id: i64) -> Option<Arc<Player>> {
        self.indices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .players
            .get(&player_id)
            .cloned()
    }

    pub fn get_by_session(&self, session_id: i64) -> Option<Arc<Player>> {
        let guard = self.indices.read().unwrap_or_else(|e| e.into_inner());
        let player_id = guard.sessions.get(&session_id)?;
        guard.players.get(player_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.indices
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .players
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persists every live profile. Failures are logged per player; one
    /// bad save must not starve the rest.
    pub async fn save_all(&self) {
        let players: Vec<Arc<Player>> = {
            let guard = self.indices.read().unwrap_or_else(|e| e.into_inner());
            guard.players.values().cloned().collect()
        };
        for player in players {
            if player.state() == PlayerState::Destroyed {
                continue;
            }
            if let Err(e) = self.store.save_profile(&player.profile_snapshot()).await {
                tracing::warn!(
                    player = player.player_id(),
                    error = %e,
                    "profile save failed"
                );
            }
        }
    }

    /// Background persistence tick. Runs until the token cancels, saving
    /// once more on the way out.
    pub async fn persist_loop(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        if interval.is_zero() {
            return;
        }
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.save_all().await;
                    return;
                }
                _ = ticker.tick() => self.save_all().await,
            }
        }
    }

    fn rebind_session(&self, session_id: i64, player_id: i64) {
        let mut guard = self.indices.write().unwrap_or_else(|e| e.into_inner());
        // Drop the stale binding from before the disconnect.
        guard.sessions.retain(|_, bound| *bound != player_id);
        guard.sessions.insert(session_id, player_id);
    }
}
