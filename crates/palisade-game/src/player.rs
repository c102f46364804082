//! The per-player actor.
//!
//! Each live player is one worker task consuming one bounded inbox.
//! All module code for a player runs on that worker, serialized, so
//! profile state needs no module-level locking and two handlers for the
//! same player can never overlap.
//!
//! ```text
//!   post/dispatch/notify ──→ [inbox (64)] ──→ worker ──→ modules
//!                                │                          │
//!                                └── full → PlayerBusy      └─ reply slot
//! ```
//!
//! Lifecycle: `Active ↔ Offline` (disconnect / resume, the worker keeps
//! running), `* → Destroyed` (manager only; the worker drains the inbox,
//! fails pending replies, and exits).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use palisade_protocol::Envelope;
use palisade_store::PlayerProfile;
use tokio::sync::{mpsc, oneshot};

use crate::module::{ModuleOutcome, PlayerCtx, PlayerModule};
use crate::GameError;

/// Inbox capacity; overflow is the `PlayerBusy` backpressure signal.
pub const INBOX_CAPACITY: usize = 64;

/// How long a request/reply dispatch waits for the worker.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Actor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlayerState {
    Active = 0,
    Offline = 1,
    Destroyed = 2,
}

impl PlayerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PlayerState::Active,
            1 => PlayerState::Offline,
            _ => PlayerState::Destroyed,
        }
    }
}

type ReplySlot = oneshot::Sender<Result<Option<Envelope>, GameError>>;

enum PlayerMsg {
    /// A business envelope, optionally carrying a reply slot.
    Handle {
        env: Envelope,
        reply: Option<ReplySlot>,
    },
    Resume { session_id: i64 },
    Offline,
    Destroy,
}

/// Handle to a live player actor.
pub struct Player {
    player_id: i64,
    session_id: AtomicI64,
    state: AtomicU8,
    profile: Arc<Mutex<PlayerProfile>>,
    inbox: mpsc::Sender<PlayerMsg>,
}

impl Player {
    /// Initializes the modules and starts the worker.
    pub fn spawn(
        player_id: i64,
        session_id: i64,
        profile: PlayerProfile,
        mut modules: Vec<Box<dyn PlayerModule>>,
    ) -> Result<Arc<Self>, GameError> {
        let profile = Arc::new(Mutex::new(profile));
        let ctx = PlayerCtx {
            player_id,
            session_id,
            profile: Arc::clone(&profile),
        };
        for module in &mut modules {
            module.init(&ctx)?;
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let player = Arc::new(Self {
            player_id,
            session_id: AtomicI64::new(session_id),
            state: AtomicU8::new(PlayerState::Active as u8),
            profile,
            inbox: tx,
        });

        let worker = PlayerWorker {
            ctx,
            modules,
            inbox: rx,
        };
        tokio::spawn(worker.run());

        Ok(player)
    }

    pub fn player_id(&self) -> i64 {
        self.player_id
    }

    /// The Gate session currently bound to this player.
    pub fn session_id(&self) -> i64 {
        self.session_id.load(Ordering::Acquire)
    }

    pub fn state(&self) -> PlayerState {
        PlayerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Clones the current profile for persistence. The worker remains the
    /// only writer.
    pub fn profile_snapshot(&self) -> PlayerProfile {
        self.profile.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn admit(&self) -> Result<(), GameError> {
        match self.state() {
            PlayerState::Active => Ok(()),
            PlayerState::Offline => Err(GameError::PlayerOffline),
            PlayerState::Destroyed => Err(GameError::PlayerDestroyed),
        }
    }

    /// Non-blocking offer. Full inbox → [`GameError::PlayerBusy`].
    pub fn post(&self, env: Envelope) -> Result<(), GameError> {
        self.admit()?;
        self.offer(PlayerMsg::Handle { env, reply: None })
    }

    /// Fire-and-forget, same admission as [`post`](Self::post).
    pub fn notify(&self, env: Envelope) -> Result<(), GameError> {
        self.post(env)
    }

    /// Request/reply: enqueues like `post`, then waits up to
    /// [`DISPATCH_TIMEOUT`] for the worker's reply.
    pub async fn dispatch(&self, env: Envelope) -> Result<Option<Envelope>, GameError> {
        self.admit()?;
        let (tx, rx) = oneshot::channel();
        self.offer(PlayerMsg::Handle {
            env,
            reply: Some(tx),
        })?;

        match tokio::time::timeout(DISPATCH_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            // Worker dropped the slot: it exited while we waited.
            Ok(Err(_)) => Err(GameError::PlayerDestroyed),
            Err(_) => Err(GameError::PlayerReplyTimeout),
        }
    }

    /// Reattaches the player to a new Gate session.
    pub async fn resume(&self, session_id: i64) -> Result<(), GameError> {
        if self.state() == PlayerState::Destroyed {
            return Err(GameError::PlayerDestroyed);
        }
        self.session_id.store(session_id, Ordering::Release);
        self.inbox
            .send(PlayerMsg::Resume { session_id })
            .await
            .map_err(|_| GameError::PlayerDestroyed)?;
        self.state
            .store(PlayerState::Active as u8, Ordering::Release);
        Ok(())
    }

    /// Marks the player offline. The worker keeps running so a resume can
    /// follow; only new messages are refused.
    pub async fn offline(&self) -> Result<(), GameError> {
        if self.state() == PlayerState::Destroyed {
            return Err(GameError::PlayerDestroyed);
        }
        self.state
            .store(PlayerState::Offline as u8, Ordering::Release);
        self.inbox
            .send(PlayerMsg::Offline)
            .await
            .map_err(|_| GameError::PlayerDestroyed)
    }

    /// Tears the actor down. Manager-only; pending replies fail with
    /// [`GameError::PlayerDestroyed`].
    pub(crate) async fn destroy(&self) {
        self.state
            .store(PlayerState::Destroyed as u8, Ordering::Release);
        let _ = self.inbox.send(PlayerMsg::Destroy).await;
    }

    fn offer(&self, msg: PlayerMsg) -> Result<(), GameError> {
        match self.inbox.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(GameError::PlayerBusy),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GameError::PlayerDestroyed),
        }
    }
}

/// The single consumer of a player's inbox.
struct PlayerWorker {
    ctx: PlayerCtx,
    modules: Vec<Box<dyn PlayerModule>>,
    inbox: mpsc::Receiver<PlayerMsg>,
}

impl PlayerWorker {
    async fn run(mut self) {
        while let Some(msg) = self.inbox.recv().await {
            match msg {
                PlayerMsg::Handle { env, reply } => {
                    let result = self.handle_envelope(&env);
                    if let Err(e) = &result {
                        tracing::warn!(
                            player = self.ctx.player_id,
                            msg_id = env.msg_id,
                            error = %e,
                            "player handler failed"
                        );
                    }
                    if let Some(slot) = reply {
                        let _ = slot.send(result);
                    }
                }
                PlayerMsg::Resume { session_id } => {
                    self.ctx.session_id = session_id;
                    for module in &mut self.modules {
                        module.on_resume(&self.ctx);
                    }
                    tracing::info!(
                        player = self.ctx.player_id,
                        session = session_id,
                        "player resumed"
                    );
                }
                PlayerMsg::Offline => {
                    for module in &mut self.modules {
                        module.on_offline(&self.ctx);
                    }
                    tracing::info!(player = self.ctx.player_id, "player offline");
                }
                PlayerMsg::Destroy => break,
            }
        }
        self.drain();
        tracing::debug!(player = self.ctx.player_id, "player worker exited");
    }

    /// Fails everything still queued after a destroy.
    fn drain(&mut self) {
        self.inbox.close();
        while let Ok(msg) = self.inbox.try_recv() {
            if let PlayerMsg::Handle {
                reply: Some(slot), ..
            } = msg
            {
                let _ = slot.send(Err(GameError::PlayerDestroyed));
            }
        }
    }

    /// Walks the modules in registration order; the first one that claims
    /// the message produces the reply. A module panic becomes the terminal
    /// error for this one envelope; the worker survives.
    fn handle_envelope(&mut self, env: &Envelope) -> Result<Option<Envelope>, GameError> {
        let ctx = &self.ctx;
        for module in &mut self.modules {
            if !module.can_handle(env.msg_id) {
                continue;
            }
            let result = catch_unwind(AssertUnwindSafe(|| module.handle(ctx, env)));
            match result {
                Ok(Ok(ModuleOutcome::Handled(reply))) => return Ok(reply),
                Ok(Ok(ModuleOutcome::Pass)) => continue,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(GameError::HandlerPanic {
                        module: module.name(),
                        msg_id: env.msg_id,
                    });
                }
            }
        }
        tracing::warn!(
            player = ctx.player_id,
            msg_id = env.msg_id,
            reason = "unhandled",
            "no module claimed message"
        );
        Ok(None)
    }
}
