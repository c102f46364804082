//! Session types: the Gate's durable view of one logical client.
//!
//! A session outlives any single connection. The state machine:
//!
//! ```text
//!   Init ──(first envelope)──→ Online ──(LoginReq)──→ Authing
//!                                │                       │
//!                                │                 (LoginRsp) ──→ Authenticated
//!                                │                       │               │
//!                                └──────(conn death)─────┴───────────────┘
//!                                                        ▼
//!                                                     Offline ──(GC)──→ Closed
//!                                                        │
//!                                                        └──(ResumeReq)──→ back to
//!                                                            Online / Authenticated
//! ```
//!
//! The conn slot is a back-reference cleared on disconnect; the session
//! keeps its token, player binding, and counters across conn deaths so a
//! client on flaky WiFi resumes instead of re-authenticating.

use std::sync::Arc;
use std::time::Instant;

use crate::conn::GateConn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Exists only conceptually, before the first envelope creates the
    /// session as Online.
    Init,
    /// Connected, not yet authenticated.
    Online,
    /// LoginReq forwarded, waiting for the Service's verdict.
    Authing,
    /// Bound to a player.
    Authenticated,
    /// No conn; waiting for a resume until the GC window closes.
    Offline,
    /// Removed. Terminal.
    Closed,
}

pub struct Session {
    pub id: i64,
    /// The resume token issued at creation; tokens are bound to their
    /// issuance, so this exact string must be presented.
    pub token: String,
    /// 0 until authenticated.
    pub player_id: i64,
    pub state: SessionState,
    pub conn: Option<Arc<GateConn>>,
    pub last_seen: Instant,
    pub auth_start: Option<Instant>,
    pub login_window_start: Option<Instant>,
    pub login_attempts: u32,
    pub unknown_msg_count: u32,
}

impl Session {
    pub fn new(id: i64, token: String, conn: Arc<GateConn>) -> Self {
        Self {
            id,
            token,
            player_id: 0,
            state: SessionState::Online,
            conn: Some(conn),
            last_seen: Instant::now(),
            auth_start: None,
            login_window_start: None,
            login_attempts: 0,
            unknown_msg_count: 0,
        }
    }

    /// Fresh-connection counters reset on a successful resume.
    pub fn reset_counters(&mut self) {
        self.login_window_start = None;
        self.login_attempts = 0;
        self.unknown_msg_count = 0;
    }
}

/// Cheap copyable snapshot for routing decisions outside the lock.
#[derive(Debug, Clone, Copy)]
pub struct SessionInfo {
    pub id: i64,
    pub state: SessionState,
    pub player_id: i64,
}
