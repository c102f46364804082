//! The Gate node: Palisade's client edge.
//!
//! The Gate terminates client TCP and WebSocket connections, owns the
//! session lifecycle (including HMAC-token resume), heartbeats and GC,
//! and relays business traffic to the Service tier over a sticky-sharded
//! connection pool.
//!
//! ```text
//! clients ──TCP/WS──→ GateServer ──→ Gate ──pool──→ Service
//!                        │            │
//!                     GateConn   SessionManager
//! ```

mod config;
mod conn;
mod error;
mod gate;
mod manager;
mod remote;
mod server;
mod session;
mod token;

pub use config::GateConfig;
pub use conn::{BUSY_STRIKE_LIMIT, ConnKind, GateConn, GateTransport, SEND_QUEUE_CAPACITY};
pub use error::GateError;
pub use gate::{Gate, GateMetrics};
pub use manager::{
    BindOutcome, ClosedSession, LoginDecision, OfflineInfo, ResumeError, ResumeOutcome,
    SessionManager,
};
pub use remote::RemoteClientPool;
pub use server::GateServer;
pub use session::{Session, SessionInfo, SessionState};
pub use token::{sign as sign_resume_token, verify as verify_resume_token};
