//! JSON config files, one per node.
//!
//! Every field has a default, so a missing key is never fatal; only an
//! unreadable or unparsable file is. Durations are plain `*_sec` integers
//! in the file and become `Duration`s at the node boundary; 0 disables
//! the timer or deadline it configures.

use std::path::Path;
use std::time::Duration;

use palisade_protocol::DEFAULT_MAX_ENVELOPE_SIZE;
use palisade_transport::ConnTimeouts;
use serde::Deserialize;
use serde::de::DeserializeOwned;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Loads a node config from a JSON file.
pub fn load<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Connection parameters of the external player store. Parsed here,
/// consumed by the deployment's store factory.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RedisConfig {
    pub addr: String,
    pub password: String,
    pub db: i64,
    pub uid_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateFileConfig {
    pub listen_addr: String,
    pub service_addr: String,
    pub service_pool_size: usize,
    pub heartbeat_interval_sec: u64,
    pub heartbeat_timeout_sec: u64,
    pub gc_interval_sec: u64,
    pub login_timeout_sec: u64,
    pub login_rate_limit_count: u32,
    pub login_rate_limit_window_sec: u64,
    pub unknown_msg_kick_count: u32,
    pub conn_read_timeout_sec: u64,
    pub conn_write_timeout_sec: u64,
    pub conn_keepalive_sec: u64,
    pub max_envelope_size: usize,
    pub enable_tcp: bool,
    pub enable_websocket: bool,
    pub websocket_listen_addr: String,
    pub websocket_path: String,
    pub websocket_use_json: bool,
    pub resume_token_secret: String,
    pub debug_heartbeat: bool,
    pub remote_retry_max: u32,
    pub remote_retry_backoff_ms: u64,
}

impl Default for GateFileConfig {
    fn default() -> Self {
        let defaults = palisade_gate::GateConfig::default();
        Self {
            listen_addr: defaults.listen_addr,
            service_addr: defaults.service_addr,
            service_pool_size: defaults.service_pool_size,
            heartbeat_interval_sec: defaults.heartbeat_interval.as_secs(),
            heartbeat_timeout_sec: defaults.heartbeat_timeout.as_secs(),
            gc_interval_sec: defaults.gc_interval.as_secs(),
            login_timeout_sec: defaults.login_timeout.as_secs(),
            login_rate_limit_count: defaults.login_rate_limit_count,
            login_rate_limit_window_sec: defaults.login_rate_limit_window.as_secs(),
            unknown_msg_kick_count: defaults.unknown_msg_kick_count,
            conn_read_timeout_sec: 0,
            conn_write_timeout_sec: 0,
            conn_keepalive_sec: defaults.conn_keepalive.as_secs(),
            max_envelope_size: defaults.max_envelope_size,
            enable_tcp: defaults.enable_tcp,
            enable_websocket: defaults.enable_websocket,
            websocket_listen_addr: defaults.websocket_listen_addr,
            websocket_path: defaults.websocket_path,
            websocket_use_json: defaults.websocket_use_json,
            resume_token_secret: defaults.resume_token_secret,
            debug_heartbeat: defaults.debug_heartbeat,
            remote_retry_max: defaults.remote_retry_max,
            remote_retry_backoff_ms: defaults.remote_retry_backoff.as_millis() as u64,
        }
    }
}

impl GateFileConfig {
    pub fn into_gate_config(self) -> palisade_gate::GateConfig {
        palisade_gate::GateConfig {
            listen_addr: self.listen_addr,
            service_addr: self.service_addr,
            service_pool_size: self.service_pool_size,
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_sec),
            heartbeat_timeout: Duration::from_secs(self.heartbeat_timeout_sec),
            gc_interval: Duration::from_secs(self.gc_interval_sec),
            login_timeout: Duration::from_secs(self.login_timeout_sec),
            login_rate_limit_count: self.login_rate_limit_count,
            login_rate_limit_window: Duration::from_secs(self.login_rate_limit_window_sec),
            unknown_msg_kick_count: self.unknown_msg_kick_count,
            conn_timeouts: ConnTimeouts::from_secs(
                self.conn_read_timeout_sec,
                self.conn_write_timeout_sec,
            ),
            conn_keepalive: Duration::from_secs(self.conn_keepalive_sec),
            max_envelope_size: self.max_envelope_size,
            enable_tcp: self.enable_tcp,
            enable_websocket: self.enable_websocket,
            websocket_listen_addr: self.websocket_listen_addr,
            websocket_path: self.websocket_path,
            websocket_use_json: self.websocket_use_json,
            resume_token_secret: self.resume_token_secret,
            debug_heartbeat: self.debug_heartbeat,
            remote_retry_max: self.remote_retry_max,
            remote_retry_backoff: Duration::from_millis(self.remote_retry_backoff_ms),
            ..palisade_gate::GateConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceFileConfig {
    pub listen_addr: String,
    pub game_addr: String,
    pub max_envelope_size: usize,
    pub conn_read_timeout_sec: u64,
    pub conn_write_timeout_sec: u64,
    pub redis: RedisConfig,
}

impl Default for ServiceFileConfig {
    fn default() -> Self {
        let defaults = palisade_service::ServiceConfig::default();
        Self {
            listen_addr: defaults.listen_addr,
            game_addr: defaults.game_addr,
            max_envelope_size: defaults.max_envelope_size,
            conn_read_timeout_sec: 0,
            conn_write_timeout_sec: 0,
            redis: RedisConfig::default(),
        }
    }
}

impl ServiceFileConfig {
    pub fn into_service_config(&self) -> palisade_service::ServiceConfig {
        palisade_service::ServiceConfig {
            listen_addr: self.listen_addr.clone(),
            game_addr: self.game_addr.clone(),
            max_envelope_size: self.max_envelope_size,
            timeouts: ConnTimeouts::from_secs(
                self.conn_read_timeout_sec,
                self.conn_write_timeout_sec,
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameFileConfig {
    pub listen_addr: String,
    pub server_id: String,
    pub persist_interval_sec: u64,
    pub max_envelope_size: usize,
    pub conn_read_timeout_sec: u64,
    pub conn_write_timeout_sec: u64,
    pub redis: RedisConfig,
}

impl Default for GameFileConfig {
    fn default() -> Self {
        let defaults = palisade_game::GameConfig::default();
        Self {
            listen_addr: defaults.listen_addr,
            server_id: String::new(),
            persist_interval_sec: defaults.persist_interval.as_secs(),
            max_envelope_size: defaults.max_envelope_size,
            conn_read_timeout_sec: 0,
            conn_write_timeout_sec: 0,
            redis: RedisConfig::default(),
        }
    }
}

impl GameFileConfig {
    pub fn into_game_config(&self) -> palisade_game::GameConfig {
        palisade_game::GameConfig {
            listen_addr: self.listen_addr.clone(),
            max_envelope_size: self.max_envelope_size,
            persist_interval: Duration::from_secs(self.persist_interval_sec),
            timeouts: ConnTimeouts::from_secs(
                self.conn_read_timeout_sec,
                self.conn_write_timeout_sec,
            ),
        }
    }
}
