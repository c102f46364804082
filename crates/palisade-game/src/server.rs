//! The Game node's network face.
//!
//! Accepts framed TCP connections from the Service tier and dispatches
//! game-band envelopes to player actors. Each envelope is handled on its
//! own task so a slow player (or a 5s dispatch wait) never stalls the
//! link.

use std::sync::Arc;
use std::time::Duration;

use palisade_protocol::{DEFAULT_MAX_ENVELOPE_SIZE, Envelope, msgid, route_for};
use palisade_store::PlayerStore;
use palisade_transport::{Conn, ConnTimeouts, FramedTcp};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::manager::PlayerManager;
use crate::modules::default_modules;
use crate::player::Player;
use crate::GameError;

/// Game node settings.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub listen_addr: String,
    pub max_envelope_size: usize,
    pub persist_interval: Duration,
    pub timeouts: ConnTimeouts,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9300".to_string(),
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            persist_interval: Duration::from_secs(60),
            timeouts: ConnTimeouts::default(),
        }
    }
}

pub struct GameServer {
    config: GameConfig,
    players: Arc<PlayerManager>,
}

impl GameServer {
    pub fn new(config: GameConfig, store: Arc<dyn PlayerStore>) -> Self {
        Self {
            config,
            players: Arc::new(PlayerManager::new(store, default_modules)),
        }
    }

    pub fn players(&self) -> Arc<PlayerManager> {
        Arc::clone(&self.players)
    }

    /// Accept loop; runs until the root token cancels.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), GameError> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(palisade_transport::TransportError::Io)?;
        tracing::info!(addr = %self.config.listen_addr, "game node listening");

        tokio::spawn(
            Arc::clone(&self.players).persist_loop(self.config.persist_interval, cancel.clone()),
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.players.save_all().await;
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    tracing::info!(%peer, "service link accepted");
                    let conn = Arc::new(FramedTcp::new(
                        stream,
                        self.config.max_envelope_size,
                        self.config.timeouts,
                    ));
                    let players = Arc::clone(&self.players);
                    let cancel = cancel.clone();
                    tokio::spawn(serve_link(players, conn, cancel));
                }
            }
        }
    }
}

/// Read loop for one Service link.
async fn serve_link(
    players: Arc<PlayerManager>,
    conn: Arc<FramedTcp>,
    cancel: CancellationToken,
) {
    loop {
        let env = tokio::select! {
            _ = cancel.cancelled() => break,
            read = conn.read_envelope() => match read {
                Ok(env) => env,
                Err(e) => {
                    if !matches!(e, palisade_transport::TransportError::Closed) {
                        tracing::warn!(error = %e, "service link read failed");
                    }
                    break;
                }
            }
        };
        let players = Arc::clone(&players);
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            handle_envelope(players, conn, env).await;
        });
    }
    conn.close().await;
    tracing::info!("service link closed");
}

async fn handle_envelope(players: Arc<PlayerManager>, conn: Arc<FramedTcp>, env: Envelope) {
    match env.msg_id {
        msgid::PLAYER_ENTER_GAME_REQ | msgid::LOAD_PLAYER_DATA_REQ => {
            let player = match players.get_or_create(env.session_id, env.player_id).await {
                Ok(player) => player,
                Err(e) => {
                    tracing::warn!(
                        msg_id = env.msg_id,
                        session = env.session_id,
                        player = env.player_id,
                        error = %e,
                        "load player failed"
                    );
                    return;
                }
            };
            dispatch_and_reply(player.as_ref(), &conn, env).await;
        }
        msgid::PLAYER_RESUME_REQ => {
            if let Err(e) = players.resume_player(env.session_id, env.player_id).await {
                tracing::warn!(
                    session = env.session_id,
                    player = env.player_id,
                    error = %e,
                    "resume player failed"
                );
            }
        }
        msgid::PLAYER_OFFLINE_NOTIFY => {
            if let Err(e) = players.mark_offline(env.player_id).await {
                tracing::debug!(player = env.player_id, error = %e, "offline notify ignored");
            }
        }
        id if route_for(id).is_some_and(|r| r.target == palisade_protocol::RouteTarget::Game) => {
            let Some(player) = players.get(env.player_id) else {
                tracing::warn!(
                    msg_id = id,
                    player = env.player_id,
                    reason = "player_not_ready",
                    "dropping game message for unknown player"
                );
                return;
            };
            dispatch_and_reply(player.as_ref(), &conn, env).await;
        }
        id => {
            tracing::warn!(msg_id = id, reason = "unknown_msg_id", "unroutable envelope");
        }
    }
}

async fn dispatch_and_reply(player: &Player, conn: &Arc<FramedTcp>, env: Envelope) {
    let msg_id = env.msg_id;
    let session = env.session_id;
    match player.dispatch(env).await {
        Ok(Some(reply)) => {
            if let Err(e) = conn.write_envelope(&reply).await {
                tracing::warn!(
                    msg_id,
                    session,
                    error = %e,
                    "reply to service failed"
                );
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(
                msg_id,
                session,
                player = player.player_id(),
                error = %e,
                "player dispatch failed"
            );
        }
    }
}
