//! The Gate core: the single event path every client envelope walks.
//!
//! ```text
//! ClientConn ──→ on_client_envelope ──┬─ ResumeReq  → resume machine
//!                                     ├─ first msg  → create session + SessionInit
//!                                     ├─ LoginReq   → admission → Service
//!                                     ├─ Heartbeat  → HeartbeatRsp
//!                                     └─ business   → route table → pool → Service/Game
//!
//! Service ──→ on_service_envelope ──┬─ LoginRsp → bind player (kick duplicates)
//!                                   └─ anything → reply to client
//! ```
//!
//! All session transitions go through the [`SessionManager`]; the Gate
//! performs the side effects (sends, closes, Game notifications) outside
//! its lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use palisade_protocol::messages::{LoginRsp, ResumeReq, ResumeRsp, SessionInit};
use palisade_protocol::{Codec, Envelope, JsonCodec, msgid, route_for};
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::conn::GateConn;
use crate::manager::{LoginDecision, ResumeError, SessionManager};
use crate::remote::RemoteClientPool;
use crate::session::{Session, SessionState};
use crate::token;
use crate::GateError;

/// Counters reported by the stats loop (swap-to-zero per report).
#[derive(Default)]
pub struct GateMetrics {
    pub heartbeat_timeouts: AtomicU64,
    pub login_timeouts: AtomicU64,
    pub login_rate_limited: AtomicU64,
    pub unknown_msgs: AtomicU64,
    pub conn_busy: AtomicU64,
}

pub struct Gate {
    config: GateConfig,
    sessions: SessionManager,
    pool: RemoteClientPool,
    codec: JsonCodec,
    metrics: GateMetrics,
}

impl Gate {
    pub fn new(config: GateConfig) -> Arc<Self> {
        let pool = RemoteClientPool::new(
            &config.service_addr,
            config.service_pool_size,
            config.max_envelope_size,
            config.conn_timeouts,
            config.remote_retry_max,
            config.remote_retry_backoff,
        );
        Arc::new(Self {
            config,
            sessions: SessionManager::new(),
            pool,
            codec: JsonCodec,
            metrics: GateMetrics::default(),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn metrics(&self) -> &GateMetrics {
        &self.metrics
    }

    /// Starts the pool and the background loops (service pump, heartbeat,
    /// GC, stats). Accept loops live in [`server`](crate::server).
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let mut inbound = self
            .pool
            .start(self.config.service_ping_interval, cancel.clone())
            .await;

        {
            let gate = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    let env = tokio::select! {
                        _ = cancel.cancelled() => return,
                        env = inbound.recv() => match env {
                            Some(env) => env,
                            None => return,
                        }
                    };
                    gate.on_service_envelope(env).await;
                }
            });
        }

        self.spawn_tick(cancel.clone(), self.config.heartbeat_interval, |gate| async move {
            gate.check_heartbeat().await;
        });
        self.spawn_tick(cancel.clone(), self.config.gc_interval, |gate| async move {
            gate.gc_tick().await;
        });
        self.spawn_tick(cancel, self.config.stats_interval, |gate| async move {
            gate.report_stats();
        });
    }

    fn spawn_tick<F, Fut>(
        self: &Arc<Self>,
        cancel: CancellationToken,
        period: std::time::Duration,
        tick: F,
    ) where
        F: Fn(Arc<Gate>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        if period.is_zero() {
            return;
        }
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => tick(Arc::clone(&gate)).await,
                }
            }
        });
    }

    // -----------------------------------------------------------------
    // Client path
    // -----------------------------------------------------------------

    /// The single entry point for everything a client conn reads.
    pub async fn on_client_envelope(self: &Arc<Self>, conn: &Arc<GateConn>, mut env: Envelope) {
        let msg_id = env.msg_id;

        // Resume negotiates before any session binding.
        if msg_id == msgid::RESUME_REQ {
            self.handle_resume(conn, &env).await;
            return;
        }

        // First envelope on an unbound conn creates the session.
        if conn.session_id() == 0 {
            self.create_session(conn);
        }
        let session_id = conn.session_id();
        env.session_id = session_id;

        let Some(info) = self.sessions.info(session_id) else {
            tracing::warn!(
                msg_id,
                session = session_id,
                trace_id = %conn.trace_id(),
                reason = "session_not_found",
                "rejecting msg without session"
            );
            conn.close();
            return;
        };
        if info.state == SessionState::Offline {
            tracing::warn!(
                msg_id,
                session = session_id,
                player = info.player_id,
                trace_id = %conn.trace_id(),
                reason = "session_offline",
                "rejecting msg on offline session"
            );
            return;
        }

        if msg_id == msgid::LOGIN_REQ {
            self.handle_login_req(conn, env, info.player_id).await;
            return;
        }

        if msg_id == msgid::HEARTBEAT_REQ {
            self.on_heartbeat(session_id, conn);
            return;
        }

        // Everything below needs an authenticated session.
        if matches!(info.state, SessionState::Online | SessionState::Authing) {
            tracing::warn!(
                msg_id,
                session = session_id,
                trace_id = %conn.trace_id(),
                reason = "unauthenticated",
                "dropping business msg before login"
            );
            return;
        }

        let Some(_rule) = route_for(msg_id) else {
            self.metrics.unknown_msgs.fetch_add(1, Ordering::Relaxed);
            let (count, kick) = self
                .sessions
                .note_unknown_msg(session_id, self.config.unknown_msg_kick_count);
            tracing::warn!(
                msg_id,
                session = session_id,
                player = info.player_id,
                trace_id = %conn.trace_id(),
                reason = "unknown_route",
                strikes = count,
                "unroutable msg id"
            );
            if kick {
                self.force_offline(session_id, "unknown msg limit").await;
            }
            return;
        };

        // Service-bound and Game-bound traffic both ride the pool; the
        // Service relays the game band onward.
        self.sessions.touch(session_id);
        env.player_id = info.player_id;
        self.forward(session_id, env).await;
    }

    async fn handle_login_req(self: &Arc<Self>, conn: &Arc<GateConn>, env: Envelope, player_id: i64) {
        let session_id = env.session_id;
        match self.sessions.admit_login(
            session_id,
            self.config.login_rate_limit_count,
            self.config.login_rate_limit_window,
        ) {
            LoginDecision::Begin => {
                self.forward(session_id, env).await;
            }
            LoginDecision::AlreadyAuthing => {
                tracing::warn!(
                    session = session_id,
                    trace_id = %conn.trace_id(),
                    reason = "duplicate_login",
                    "duplicate LoginReq while authing"
                );
            }
            LoginDecision::AlreadyAuthenticated => {
                tracing::warn!(
                    session = session_id,
                    player = player_id,
                    trace_id = %conn.trace_id(),
                    reason = "duplicate_login",
                    "LoginReq on authenticated session"
                );
            }
            LoginDecision::RateLimited => {
                self.metrics.login_rate_limited.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    session = session_id,
                    trace_id = %conn.trace_id(),
                    reason = "login_rate_limited",
                    "login admission refused"
                );
            }
            LoginDecision::Rejected | LoginDecision::NotFound => {
                tracing::warn!(
                    session = session_id,
                    trace_id = %conn.trace_id(),
                    reason = "login_rejected",
                    "LoginReq in unloggable state"
                );
            }
        }
    }

    /// Creates the session for a fresh conn and pushes `SessionInit`.
    fn create_session(self: &Arc<Self>, conn: &Arc<GateConn>) -> i64 {
        let id = self.sessions.allocate_id();
        let token = token::sign(self.config.resume_token_secret.as_bytes(), id);
        self.sessions
            .insert(Session::new(id, token.clone(), Arc::clone(conn)));
        conn.bind_session(id);

        let init = SessionInit {
            session_id: id,
            token,
        };
        match self.codec.encode(&init) {
            Ok(payload) => {
                let env = Envelope::new(msgid::SESSION_INIT, id, 0, payload);
                if let Err(e) = conn.send(env) {
                    tracing::warn!(session = id, error = %e, "session init send failed");
                }
            }
            Err(e) => tracing::error!(session = id, error = %e, "session init encode failed"),
        }
        tracing::info!(session = id, trace_id = %conn.trace_id(), "session init");
        id
    }

    // -----------------------------------------------------------------
    // Resume
    // -----------------------------------------------------------------

    async fn handle_resume(self: &Arc<Self>, conn: &Arc<GateConn>, env: &Envelope) {
        // A conn may resume only before it is bound to anything.
        if conn.session_id() != 0 {
            tracing::warn!(
                session = conn.session_id(),
                trace_id = %conn.trace_id(),
                reason = "conn_bound",
                "resume on bound conn"
            );
            self.send_resume_rsp(conn, conn.session_id(), false, "conn bound").await;
            conn.close();
            return;
        }

        let req: ResumeReq = match self.codec.decode(&env.payload) {
            Ok(req) => req,
            Err(_) => {
                conn.close();
                return;
            }
        };

        // Bound-to-issuance: the presented token must be the exact string
        // this session was issued, and the MAC must check out.
        let stored = self.sessions.token_of(req.session_id);
        let valid = stored.as_deref() == Some(req.token.as_str())
            && token::verify(
                self.config.resume_token_secret.as_bytes(),
                req.session_id,
                &req.token,
            );
        if !valid {
            tracing::warn!(
                session = req.session_id,
                trace_id = %conn.trace_id(),
                reason = "invalid_token",
                "resume verification failed"
            );
            self.send_resume_rsp(conn, req.session_id, false, "invalid session").await;
            conn.close();
            return;
        }

        match self.sessions.try_resume(req.session_id, Arc::clone(conn)) {
            Ok(outcome) => {
                if let Some(old) = outcome.old_conn {
                    if old.id() != conn.id() {
                        tracing::warn!(
                            session = req.session_id,
                            old_conn = old.id(),
                            "resume replacing stale conn"
                        );
                        old.close();
                    }
                }
                conn.bind_session(req.session_id);
                conn.mark_alive();
                self.send_resume_rsp(conn, req.session_id, true, "").await;
                tracing::info!(
                    session = req.session_id,
                    player = outcome.player_id,
                    state = ?outcome.restored,
                    trace_id = %conn.trace_id(),
                    "session resumed"
                );
                if outcome.player_id != 0 {
                    self.notify_game(msgid::PLAYER_RESUME_REQ, req.session_id, outcome.player_id)
                        .await;
                }
            }
            Err(reason) => {
                let text = match reason {
                    ResumeError::Authing => "session authing",
                    ResumeError::Closed => "session closed",
                    ResumeError::NotFound => "invalid session",
                };
                tracing::warn!(
                    session = req.session_id,
                    trace_id = %conn.trace_id(),
                    reason = text,
                    "resume refused"
                );
                self.send_resume_rsp(conn, req.session_id, false, text).await;
                conn.close();
            }
        }
    }

    /// Resume responses write directly so a refusal still reaches the
    /// wire before the close that follows it.
    async fn send_resume_rsp(&self, conn: &Arc<GateConn>, session_id: i64, ok: bool, reason: &str) {
        let rsp = ResumeRsp {
            ok,
            reason: reason.to_string(),
        };
        let Ok(payload) = self.codec.encode(&rsp) else {
            return;
        };
        let env = Envelope::new(msgid::RESUME_RSP, session_id, 0, payload);
        let _ = conn.send_now(&env).await;
    }

    // -----------------------------------------------------------------
    // Heartbeat
    // -----------------------------------------------------------------

    fn on_heartbeat(&self, session_id: i64, conn: &Arc<GateConn>) {
        if self.sessions.heartbeat(session_id).is_none() {
            return;
        }
        conn.mark_alive();
        let env = Envelope::new(msgid::HEARTBEAT_RSP, session_id, 0, Vec::new());
        if let Err(e) = conn.send(env) {
            self.note_send_error(&e);
        }
        if self.config.debug_heartbeat {
            tracing::debug!(
                session = session_id,
                conn_id = conn.id(),
                trace_id = %conn.trace_id(),
                "heartbeat"
            );
        }
    }

    async fn check_heartbeat(self: &Arc<Self>) {
        if self.config.heartbeat_timeout.is_zero() {
            return;
        }
        for (session_id, idle) in self
            .sessions
            .idle_conn_sessions(self.config.heartbeat_timeout)
        {
            self.metrics.heartbeat_timeouts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                session = session_id,
                idle_ms = idle.as_millis() as u64,
                reason = "heartbeat_timeout",
                "kicking silent conn"
            );
            self.force_offline(session_id, "heartbeat timeout").await;
        }
    }

    // -----------------------------------------------------------------
    // GC and stats
    // -----------------------------------------------------------------

    async fn gc_tick(self: &Arc<Self>) {
        for session_id in self.sessions.authing_timeouts(self.config.login_timeout) {
            self.metrics.login_timeouts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                session = session_id,
                reason = "login_timeout",
                "login exceeded deadline"
            );
            self.force_offline(session_id, "login timeout").await;
        }

        for closed in self.sessions.gc(self.config.heartbeat_timeout) {
            tracing::info!(
                session = closed.id,
                player = closed.player_id,
                "offline session collected"
            );
        }
    }

    fn report_stats(&self) {
        let heartbeat_timeouts = self.metrics.heartbeat_timeouts.swap(0, Ordering::Relaxed);
        let login_timeouts = self.metrics.login_timeouts.swap(0, Ordering::Relaxed);
        let login_rate_limited = self.metrics.login_rate_limited.swap(0, Ordering::Relaxed);
        let unknown_msgs = self.metrics.unknown_msgs.swap(0, Ordering::Relaxed);
        let conn_busy = self.metrics.conn_busy.swap(0, Ordering::Relaxed);
        let remote_dropped = self.pool.dropped_disconnected();

        if heartbeat_timeouts == 0
            && login_timeouts == 0
            && login_rate_limited == 0
            && unknown_msgs == 0
            && conn_busy == 0
        {
            return;
        }
        tracing::info!(
            heartbeat_timeouts,
            login_timeouts,
            login_rate_limited,
            unknown_msgs,
            conn_busy,
            remote_dropped,
            sessions = self.sessions.len(),
            "gate stats"
        );
    }

    // -----------------------------------------------------------------
    // Service path
    // -----------------------------------------------------------------

    /// Everything the Service pool reads lands here.
    pub async fn on_service_envelope(self: &Arc<Self>, env: Envelope) {
        if env.msg_id == msgid::LOGIN_RSP {
            self.on_login_rsp(env.session_id, &env.payload).await;
        }
        // Default: relay to the client, LoginRsp included.
        if let Err(e) = self.reply(env.session_id, env.msg_id, env.payload) {
            tracing::warn!(
                session = env.session_id,
                error = %e,
                "service reply undeliverable"
            );
        }
    }

    async fn on_login_rsp(self: &Arc<Self>, session_id: i64, payload: &[u8]) {
        let rsp: LoginRsp = match self.codec.decode(payload) {
            Ok(rsp) => rsp,
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "malformed LoginRsp");
                return;
            }
        };
        let Some(outcome) = self.sessions.bind_player(session_id, rsp.player_id) else {
            return;
        };
        tracing::info!(
            session = session_id,
            player = rsp.player_id,
            "session authenticated"
        );
        if let Some((old_session, old_conn)) = outcome.kicked {
            tracing::warn!(
                session = old_session,
                player = rsp.player_id,
                reason = "duplicate_login",
                "kicking old session"
            );
            if let Some(old_conn) = old_conn {
                old_conn.close();
            }
        }
    }

    // -----------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------

    /// Sends to the conn currently bound to the session.
    pub fn reply(&self, session_id: i64, msg_id: i32, payload: Vec<u8>) -> Result<(), GateError> {
        let (conn, player_id) = self.sessions.reply_route(session_id)?;
        let env = Envelope::new(msg_id, session_id, player_id, payload);
        conn.send(env).inspect_err(|e| self.note_send_error(e))
    }

    /// Pushes are replies the client didn't ask for.
    pub fn push(&self, session_id: i64, msg_id: i32, payload: Vec<u8>) -> Result<(), GateError> {
        self.reply(session_id, msg_id, payload)
    }

    /// Closes the session's conn; the read loop will take the session
    /// offline.
    pub fn kick(&self, session_id: i64, reason: &str) -> Result<(), GateError> {
        let conn = self
            .sessions
            .conn_of(session_id)
            .ok_or(GateError::SessionNotFound(session_id))?;
        tracing::warn!(session = session_id, reason, "kicking session");
        conn.close();
        Ok(())
    }

    /// The read loop observed this conn die.
    pub async fn on_conn_closed(self: &Arc<Self>, conn: &Arc<GateConn>) {
        conn.close();
        let session_id = conn.session_id();
        if session_id == 0 {
            return;
        }
        let Some(info) = self.sessions.mark_offline_if_conn(session_id, conn.id()) else {
            return;
        };
        tracing::info!(
            session = session_id,
            player = info.player_id,
            trace_id = %conn.trace_id(),
            "session offline"
        );
        if info.player_id != 0 {
            self.notify_game(msgid::PLAYER_OFFLINE_NOTIFY, session_id, info.player_id)
                .await;
        }
    }

    /// Forces a session offline (timeouts, strikes), closing its conn and
    /// telling the Game when a player was bound.
    async fn force_offline(self: &Arc<Self>, session_id: i64, reason: &str) {
        let Some(info) = self.sessions.mark_offline(session_id) else {
            return;
        };
        tracing::info!(session = session_id, player = info.player_id, reason, "session offline");
        if let Some(conn) = info.conn {
            conn.close();
        }
        if info.player_id != 0 {
            self.notify_game(msgid::PLAYER_OFFLINE_NOTIFY, session_id, info.player_id)
                .await;
        }
    }

    async fn notify_game(&self, msg_id: i32, session_id: i64, player_id: i64) {
        let env = Envelope::new(msg_id, session_id, player_id, Vec::new());
        if let Err(e) = self.pool.send(session_id, env).await {
            tracing::warn!(
                msg_id,
                session = session_id,
                player = player_id,
                error = %e,
                "game notification failed"
            );
        } else {
            tracing::info!(msg_id, session = session_id, player = player_id, "game notified");
        }
    }

    async fn forward(&self, session_id: i64, env: Envelope) {
        let msg_id = env.msg_id;
        if let Err(e) = self.pool.send(session_id, env).await {
            tracing::warn!(
                msg_id,
                session = session_id,
                error = %e,
                reason = "remote_busy",
                "forward to service failed"
            );
        }
    }

    fn note_send_error(&self, err: &GateError) {
        if matches!(err, GateError::ConnBusy) {
            self.metrics.conn_busy.fetch_add(1, Ordering::Relaxed);
        }
    }
}
