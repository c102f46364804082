//! The session manager: both indices and every state transition.
//!
//! One read-write lock guards `by_session` and `by_player` together; a
//! transition is one short critical section, and the Gate performs side
//! effects (sends, closes, notifications) outside the lock with whatever
//! the transition returned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::conn::{ConnKind, GateConn};
use crate::session::{Session, SessionInfo, SessionState};

/// Decision for an incoming LoginReq on a known session.
#[derive(Debug, PartialEq, Eq)]
pub enum LoginDecision {
    /// Online → Authing; forward to the Service.
    Begin,
    /// Duplicate LoginReq while Authing; drop.
    AlreadyAuthing,
    /// LoginReq on an authenticated session's own conn; drop.
    AlreadyAuthenticated,
    /// Sliding-window admission refused the attempt.
    RateLimited,
    /// Session is in no state to log in (Offline/Closed).
    Rejected,
    NotFound,
}

/// Result of binding a player to a session after LoginRsp.
pub struct BindOutcome {
    /// A different session previously owned the player: (session id,
    /// its conn if any). The caller kicks it.
    pub kicked: Option<(i64, Option<Arc<GateConn>>)>,
}

/// Successful resume: what the Gate needs for side effects.
#[derive(Debug)]
pub struct ResumeOutcome {
    pub player_id: i64,
    pub restored: SessionState,
    /// Stale conn that was still attached; the caller closes it.
    pub old_conn: Option<Arc<GateConn>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ResumeError {
    NotFound,
    /// Resume is ambiguous mid-login.
    Authing,
    Closed,
}

/// A session that went Offline: who to tell and what to close.
pub struct OfflineInfo {
    pub player_id: i64,
    pub conn: Option<Arc<GateConn>>,
}

/// A session removed by GC.
pub struct ClosedSession {
    pub id: i64,
    pub player_id: i64,
}

#[derive(Default)]
struct Indices {
    by_session: HashMap<i64, Session>,
    by_player: HashMap<i64, i64>,
}

pub struct SessionManager {
    indices: RwLock<Indices>,
    next_id: AtomicI64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            indices: RwLock::new(Indices::default()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Monotonic per-Gate session ids; never 0.
    pub fn allocate_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn insert(&self, session: Session) {
        let mut guard = self.write();
        guard.by_session.insert(session.id, session);
    }

    pub fn len(&self) -> usize {
        self.read().by_session.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self, session_id: i64) -> Option<SessionInfo> {
        let guard = self.read();
        let s = guard.by_session.get(&session_id)?;
        Some(SessionInfo {
            id: s.id,
            state: s.state,
            player_id: s.player_id,
        })
    }

    pub fn token_of(&self, session_id: i64) -> Option<String> {
        self.read()
            .by_session
            .get(&session_id)
            .map(|s| s.token.clone())
    }

    pub fn conn_of(&self, session_id: i64) -> Option<Arc<GateConn>> {
        self.read()
            .by_session
            .get(&session_id)
            .and_then(|s| s.conn.clone())
    }

    pub fn session_of_player(&self, player_id: i64) -> Option<i64> {
        self.read().by_player.get(&player_id).copied()
    }

    /// Refreshes activity (business traffic counts as liveness).
    pub fn touch(&self, session_id: i64) {
        if let Some(s) = self.write().by_session.get_mut(&session_id) {
            s.last_seen = Instant::now();
        }
    }

    /// Admits or refuses a LoginReq, advancing the state machine and the
    /// sliding rate-limit window in one step.
    pub fn admit_login(
        &self,
        session_id: i64,
        rate_count: u32,
        rate_window: Duration,
    ) -> LoginDecision {
        let mut guard = self.write();
        let Some(s) = guard.by_session.get_mut(&session_id) else {
            return LoginDecision::NotFound;
        };

        if rate_count > 0 {
            let now = Instant::now();
            let window_expired = s
                .login_window_start
                .is_none_or(|start| now.duration_since(start) > rate_window);
            if window_expired {
                s.login_window_start = Some(now);
                s.login_attempts = 0;
            }
            s.login_attempts += 1;
            if s.login_attempts > rate_count {
                return LoginDecision::RateLimited;
            }
        }

        match s.state {
            SessionState::Online => {
                s.state = SessionState::Authing;
                s.auth_start = Some(Instant::now());
                LoginDecision::Begin
            }
            SessionState::Authing => LoginDecision::AlreadyAuthing,
            SessionState::Authenticated => LoginDecision::AlreadyAuthenticated,
            _ => LoginDecision::Rejected,
        }
    }

    /// Binds `player_id` after a LoginRsp. If another session owns the
    /// player, ownership transfers here and the old session is returned
    /// for kicking.
    pub fn bind_player(&self, session_id: i64, player_id: i64) -> Option<BindOutcome> {
        if player_id == 0 {
            return None;
        }
        let mut guard = self.write();
        guard.by_session.get_mut(&session_id)?;

        let old_id = guard.by_player.insert(player_id, session_id);
        let kicked = match old_id {
            Some(old_id) if old_id != session_id => {
                guard.by_session.get_mut(&old_id).map(|old| {
                    // Ownership transfers: the old session must not speak
                    // for the player again (nor notify the Game offline).
                    old.player_id = 0;
                    (old_id, old.conn.clone())
                })
            }
            _ => None,
        };

        let s = guard
            .by_session
            .get_mut(&session_id)
            .expect("checked above");
        s.player_id = player_id;
        s.state = SessionState::Authenticated;
        s.auth_start = None;
        s.last_seen = Instant::now();

        Some(BindOutcome { kicked })
    }

    /// Reattaches a verified resume onto `new_conn`, restoring the
    /// pre-offline state. Counters reset; a stale conn is handed back for
    /// closing.
    pub fn try_resume(
        &self,
        session_id: i64,
        new_conn: Arc<GateConn>,
    ) -> Result<ResumeOutcome, ResumeError> {
        let mut guard = self.write();
        let Some(s) = guard.by_session.get_mut(&session_id) else {
            return Err(ResumeError::NotFound);
        };

        match s.state {
            SessionState::Authing => return Err(ResumeError::Authing),
            SessionState::Closed => return Err(ResumeError::Closed),
            _ => {}
        }

        let old_conn = s.conn.replace(new_conn);
        s.state = if s.player_id != 0 {
            SessionState::Authenticated
        } else {
            SessionState::Online
        };
        s.last_seen = Instant::now();
        s.reset_counters();

        Ok(ResumeOutcome {
            player_id: s.player_id,
            restored: s.state,
            old_conn,
        })
    }

    /// Detaches the conn and parks the session Offline. Idempotent:
    /// returns `None` when already Offline/Closed.
    pub fn mark_offline(&self, session_id: i64) -> Option<OfflineInfo> {
        self.mark_offline_inner(session_id, None)
    }

    /// Like [`mark_offline`](Self::mark_offline), but only if the session
    /// is still bound to `conn_id`. A conn that died after a resume
    /// replaced it must not take the resumed session down with it.
    pub fn mark_offline_if_conn(&self, session_id: i64, conn_id: u64) -> Option<OfflineInfo> {
        self.mark_offline_inner(session_id, Some(conn_id))
    }

    fn mark_offline_inner(&self, session_id: i64, only_conn: Option<u64>) -> Option<OfflineInfo> {
        let mut guard = self.write();
        let s = guard.by_session.get_mut(&session_id)?;
        if matches!(s.state, SessionState::Offline | SessionState::Closed) {
            return None;
        }
        if let Some(conn_id) = only_conn {
            if s.conn.as_ref().map(|c| c.id()) != Some(conn_id) {
                return None;
            }
        }
        let conn = s.conn.take();
        s.state = SessionState::Offline;
        s.auth_start = None;
        s.last_seen = Instant::now();
        Some(OfflineInfo {
            player_id: s.player_id,
            conn,
        })
    }

    /// The conn currently bound to a session plus its player, in one
    /// lock acquisition; the reply destination is whatever is bound at
    /// reply time.
    pub fn reply_route(&self, session_id: i64) -> Result<(Arc<GateConn>, i64), crate::GateError> {
        let guard = self.read();
        let s = guard
            .by_session
            .get(&session_id)
            .ok_or(crate::GateError::SessionNotFound(session_id))?;
        let conn = s
            .conn
            .clone()
            .ok_or(crate::GateError::NoGateConnection(session_id))?;
        Ok((conn, s.player_id))
    }

    /// Counts an unroutable message. Returns the new count and whether
    /// the strike limit was crossed.
    pub fn note_unknown_msg(&self, session_id: i64, kick_limit: u32) -> (u32, bool) {
        let mut guard = self.write();
        let Some(s) = guard.by_session.get_mut(&session_id) else {
            return (0, false);
        };
        s.unknown_msg_count += 1;
        (
            s.unknown_msg_count,
            kick_limit > 0 && s.unknown_msg_count >= kick_limit,
        )
    }

    /// Heartbeat bookkeeping; hands back the conn for the reply.
    pub fn heartbeat(&self, session_id: i64) -> Option<Arc<GateConn>> {
        let mut guard = self.write();
        let s = guard.by_session.get_mut(&session_id)?;
        s.last_seen = Instant::now();
        s.conn.clone()
    }

    /// Sessions stuck in Authing past the login deadline.
    pub fn authing_timeouts(&self, login_timeout: Duration) -> Vec<i64> {
        let now = Instant::now();
        self.read()
            .by_session
            .values()
            .filter(|s| s.state == SessionState::Authing)
            .filter(|s| {
                s.auth_start
                    .is_some_and(|start| now.duration_since(start) > login_timeout)
            })
            .map(|s| s.id)
            .collect()
    }

    /// Sessions whose conn has been silent past the heartbeat window.
    /// WebSocket conns get 1.5× to tolerate upstream proxies.
    pub fn idle_conn_sessions(&self, heartbeat_timeout: Duration) -> Vec<(i64, Duration)> {
        let now = Instant::now();
        self.read()
            .by_session
            .values()
            .filter_map(|s| {
                let conn = s.conn.as_ref()?;
                let limit = match conn.kind() {
                    ConnKind::WebSocket => heartbeat_timeout + heartbeat_timeout / 2,
                    ConnKind::Tcp => heartbeat_timeout,
                };
                let idle = now.duration_since(conn.last_alive());
                (idle > limit).then_some((s.id, idle))
            })
            .collect()
    }

    /// Removes Offline sessions idle past the timeout. They leave both
    /// indices through Closed.
    pub fn gc(&self, timeout: Duration) -> Vec<ClosedSession> {
        let now = Instant::now();
        let mut guard = self.write();
        let expired: Vec<i64> = guard
            .by_session
            .values()
            .filter(|s| s.state == SessionState::Offline)
            .filter(|s| now.duration_since(s.last_seen) > timeout)
            .map(|s| s.id)
            .collect();

        let mut closed = Vec::with_capacity(expired.len());
        for id in expired {
            if let Some(mut s) = guard.by_session.remove(&id) {
                s.state = SessionState::Closed;
                if s.player_id != 0 {
                    guard.by_player.remove(&s.player_id);
                }
                closed.push(ClosedSession {
                    id: s.id,
                    player_id: s.player_id,
                });
            }
        }
        closed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
