//! The Service node's network face.
//!
//! Accepts any number of Gate links, tags each with a monotonic
//! `gate_id`, and remembers `session_id → gate_id` so replies and
//! Game-originated pushes travel back on the link the session arrived on.
//!
//! Incoming business envelopes are sharded into `W = 2 × CPU` worker
//! queues keyed by `|session_id| % W`: dispatch is serial within a shard
//! (preserving per-session order) and parallel across shards. Game-band
//! envelopes bypass dispatch entirely and go straight to the
//! [`GameRouter`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use palisade_protocol::{DEFAULT_MAX_ENVELOPE_SIZE, Envelope, RouteTarget, msgid, route_for};
use palisade_transport::{Conn, ConnTimeouts, FramedTcp, TransportError};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::context::ServiceContext;
use crate::dispatcher::Dispatcher;
use crate::game_router::GameRouter;
use crate::registry::Registry;
use crate::ServiceError;

/// Per-gate-link outbound queue depth.
const LINK_QUEUE_CAPACITY: usize = 8192;

/// Per-shard inbound queue depth. Senders block here, which backpressures
/// the owning gate link's read loop rather than dropping envelopes.
const SHARD_QUEUE_CAPACITY: usize = 1024;

/// Service node settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub game_addr: String,
    pub max_envelope_size: usize,
    pub timeouts: ConnTimeouts,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9200".to_string(),
            game_addr: "127.0.0.1:9300".to_string(),
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            timeouts: ConnTimeouts::default(),
        }
    }
}

/// Handle to one connected gate: its id and its outbound queue.
#[derive(Clone)]
struct GateLink {
    gate_id: u64,
    tx: mpsc::Sender<Envelope>,
}

/// Which gate owns which session, and which game route owns which player.
#[derive(Default)]
struct RouteTable {
    links: RwLock<HashMap<u64, GateLink>>,
    session_gate: RwLock<HashMap<i64, u64>>,
    /// Reserved for sharded Game deployments; today every player maps to
    /// the single game router.
    player_route: RwLock<HashMap<i64, ()>>,
}

impl RouteTable {
    fn link_for_session(&self, session_id: i64) -> Option<GateLink> {
        let gate_id = *self
            .session_gate
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&session_id)?;
        self.links
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&gate_id)
            .cloned()
    }

    fn bind_session(&self, session_id: i64, gate_id: u64) {
        self.session_gate
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(session_id, gate_id);
    }

    fn add_link(&self, link: GateLink) {
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(link.gate_id, link);
    }

    fn remove_link(&self, gate_id: u64) {
        self.links
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&gate_id);
        self.session_gate
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|_, bound| *bound != gate_id);
    }

    fn bind_player(&self, player_id: i64) {
        if player_id != 0 {
            self.player_route
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .entry(player_id)
                .or_insert(());
        }
    }

    fn unbind_player(&self, player_id: i64) {
        self.player_route
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&player_id);
    }
}

/// One unit of shard work: an envelope plus the outbound queue of the
/// gate it arrived on.
struct ShardJob {
    reply_tx: mpsc::Sender<Envelope>,
    env: Envelope,
}

pub struct NetServer {
    config: ServiceConfig,
    dispatcher: Arc<Dispatcher>,
    game: Arc<GameRouter>,
    routes: Arc<RouteTable>,
    next_gate_id: AtomicU64,
}

impl NetServer {
    pub fn new(config: ServiceConfig, registry: Registry) -> Self {
        let game = GameRouter::new(
            &config.game_addr,
            config.max_envelope_size,
            config.timeouts,
        );
        Self {
            config,
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry))),
            game,
            routes: Arc::new(RouteTable::default()),
            next_gate_id: AtomicU64::new(1),
        }
    }

    /// Runs the node: game link, shard workers, gate accept loop.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ServiceError> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .map_err(TransportError::Io)?;
        tracing::info!(addr = %self.config.listen_addr, "service node listening");

        // Game link up first: leaves-first connection order.
        let mut game_inbound = self.game.start(cancel.clone()).await;
        {
            let routes = Arc::clone(&self.routes);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let env = tokio::select! {
                        _ = cancel.cancelled() => return,
                        env = game_inbound.recv() => match env {
                            Some(env) => env,
                            None => return,
                        }
                    };
                    forward_to_gate(&routes, env).await;
                }
            });
        }

        let shards = self.spawn_shard_workers(&cancel);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let gate_id = self.next_gate_id.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(gate_id, %peer, "gate link accepted");
                    let conn = Arc::new(FramedTcp::new(
                        stream,
                        self.config.max_envelope_size,
                        self.config.timeouts,
                    ));
                    tokio::spawn(Arc::clone(&self).serve_gate(
                        gate_id,
                        conn,
                        shards.clone(),
                        cancel.clone(),
                    ));
                }
            }
        }
    }

    fn spawn_shard_workers(&self, cancel: &CancellationToken) -> Vec<mpsc::Sender<ShardJob>> {
        let count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            * 2;
        let mut senders = Vec::with_capacity(count);
        for shard in 0..count {
            let (tx, mut rx) = mpsc::channel::<ShardJob>(SHARD_QUEUE_CAPACITY);
            senders.push(tx);
            let dispatcher = Arc::clone(&self.dispatcher);
            let game = Arc::clone(&self.game);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = cancel.cancelled() => return,
                        job = rx.recv() => match job {
                            Some(job) => job,
                            None => return,
                        }
                    };
                    let mut ctx = ServiceContext::new(
                        &job.env,
                        job.reply_tx,
                        Arc::clone(&game),
                        cancel.clone(),
                    );
                    dispatcher.dispatch(&mut ctx).await;
                }
            });
            tracing::debug!(shard, "shard worker started");
        }
        senders
    }

    /// Reader for one gate link; the paired writer drains the link queue.
    async fn serve_gate(
        self: Arc<Self>,
        gate_id: u64,
        conn: Arc<FramedTcp>,
        shards: Vec<mpsc::Sender<ShardJob>>,
        cancel: CancellationToken,
    ) {
        let (tx, mut rx) = mpsc::channel::<Envelope>(LINK_QUEUE_CAPACITY);
        self.routes.add_link(GateLink {
            gate_id,
            tx: tx.clone(),
        });

        let writer = {
            let conn = Arc::clone(&conn);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let env = tokio::select! {
                        _ = cancel.cancelled() => return,
                        env = rx.recv() => match env {
                            Some(env) => env,
                            None => return,
                        }
                    };
                    if let Err(e) = conn.write_envelope(&env).await {
                        tracing::warn!(error = %e, "gate write failed");
                        return;
                    }
                }
            })
        };

        loop {
            let env = tokio::select! {
                _ = cancel.cancelled() => break,
                read = conn.read_envelope() => match read {
                    Ok(env) => env,
                    Err(e) => {
                        if !matches!(e, TransportError::Closed) {
                            tracing::warn!(gate_id, error = %e, "gate link read failed");
                        }
                        break;
                    }
                }
            };
            self.on_gate_envelope(gate_id, &tx, &shards, env).await;
        }

        self.routes.remove_link(gate_id);
        writer.abort();
        conn.close().await;
        tracing::info!(gate_id, "gate link closed");
    }

    async fn on_gate_envelope(
        &self,
        gate_id: u64,
        reply_tx: &mpsc::Sender<Envelope>,
        shards: &[mpsc::Sender<ShardJob>],
        env: Envelope,
    ) {
        // Pool keep-alive: answer in place.
        if env.msg_id == msgid::SERVICE_PING {
            let pong = Envelope::new(msgid::SERVICE_PONG, env.session_id, 0, Vec::new());
            let _ = reply_tx.try_send(pong);
            return;
        }

        // Remember the return path before any forwarding: Game replies
        // for this session must find the gate it arrived on.
        if env.session_id != 0 {
            self.routes.bind_session(env.session_id, gate_id);
        }

        // Game-bound traffic bypasses dispatch.
        if route_for(env.msg_id).is_some_and(|r| r.target == RouteTarget::Game) {
            self.route_to_game(env);
            return;
        }

        let shard = (env.session_id.unsigned_abs() as usize) % shards.len();
        let job = ShardJob {
            reply_tx: reply_tx.clone(),
            env,
        };
        // Blocking here applies backpressure to this gate's read loop.
        if shards[shard].send(job).await.is_err() {
            tracing::warn!(shard, "shard worker gone, dropping envelope");
        }
    }

    fn route_to_game(&self, env: Envelope) {
        let msg_id = env.msg_id;
        let player_id = env.player_id;
        self.routes.bind_player(player_id);

        if let Err(e) = self.game.send(env) {
            tracing::warn!(
                msg_id,
                player = player_id,
                error = %e,
                "route to game failed"
            );
        }
        if msg_id == msgid::PLAYER_OFFLINE_NOTIFY && player_id != 0 {
            self.routes.unbind_player(player_id);
        }
    }
}

/// Delivers a Game-originated envelope to the gate owning its session.
async fn forward_to_gate(routes: &RouteTable, env: Envelope) {
    let Some(link) = routes.link_for_session(env.session_id) else {
        tracing::warn!(
            msg_id = env.msg_id,
            session = env.session_id,
            reason = "no_gate_connection",
            "dropping game push"
        );
        return;
    };
    if link.tx.send(env).await.is_err() {
        tracing::warn!(gate_id = link.gate_id, "gate link queue closed");
    }
}
