//! Gate node settings.

use std::time::Duration;

use palisade_protocol::DEFAULT_MAX_ENVELOPE_SIZE;
use palisade_transport::ConnTimeouts;

/// Everything the Gate reads at startup. One instance, never mutated
/// after construction.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Client-facing TCP bind address.
    pub listen_addr: String,
    /// Upstream Service address for the pool.
    pub service_addr: String,
    /// Number of parallel Service connections.
    pub service_pool_size: usize,

    /// Heartbeat check tick.
    pub heartbeat_interval: Duration,
    /// Client idle threshold before a kick. WebSocket conns get 1.5×.
    pub heartbeat_timeout: Duration,
    /// Offline-session GC tick.
    pub gc_interval: Duration,
    /// Max time a session may sit in Authing.
    pub login_timeout: Duration,

    /// Sliding-window login admission: more than `count` attempts inside
    /// `window` are rejected. 0 disables the limit.
    pub login_rate_limit_count: u32,
    pub login_rate_limit_window: Duration,

    /// Unknown-route strikes before the session is forced offline.
    pub unknown_msg_kick_count: u32,

    /// Client transport deadlines; zero = none.
    pub conn_timeouts: ConnTimeouts,
    /// OS keepalive on accepted sockets; zero disables.
    pub conn_keepalive: Duration,
    pub max_envelope_size: usize,

    pub enable_tcp: bool,
    pub enable_websocket: bool,
    pub websocket_listen_addr: String,
    pub websocket_path: String,
    /// Write envelopes to WS clients as JSON text instead of binary.
    pub websocket_use_json: bool,

    /// HMAC key for resume tokens.
    pub resume_token_secret: String,
    /// Log every heartbeat at debug level.
    pub debug_heartbeat: bool,

    /// Pool send retries and their spacing before `RemoteBusy`.
    pub remote_retry_max: u32,
    pub remote_retry_backoff: Duration,
    /// Keep-alive cadence on the Service links.
    pub service_ping_interval: Duration,
    /// Counter report cadence.
    pub stats_interval: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:9100".to_string(),
            service_addr: "127.0.0.1:9200".to_string(),
            service_pool_size: 4,
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(30),
            gc_interval: Duration::from_secs(60),
            login_timeout: Duration::from_secs(10),
            login_rate_limit_count: 5,
            login_rate_limit_window: Duration::from_secs(10),
            unknown_msg_kick_count: 10,
            conn_timeouts: ConnTimeouts::default(),
            conn_keepalive: Duration::from_secs(60),
            max_envelope_size: DEFAULT_MAX_ENVELOPE_SIZE,
            enable_tcp: true,
            enable_websocket: false,
            websocket_listen_addr: "127.0.0.1:9101".to_string(),
            websocket_path: "/ws".to_string(),
            websocket_use_json: false,
            resume_token_secret: "change-me".to_string(),
            debug_heartbeat: false,
            remote_retry_max: 3,
            remote_retry_backoff: Duration::from_millis(10),
            service_ping_interval: Duration::from_secs(30),
            stats_interval: Duration::from_secs(60),
        }
    }
}
