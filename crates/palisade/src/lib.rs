//! Node wiring shared by the three binaries: config files, tracing
//! setup, the store seam, and signal-driven shutdown.

pub mod config;

use std::sync::Arc;

use palisade_store::{MemoryStore, PlayerStore};
use tokio_util::sync::CancellationToken;

use crate::config::RedisConfig;

/// Installs the tracing subscriber. `RUST_LOG` filters as usual;
/// defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// The store seam. The Redis-backed [`PlayerStore`] ships with the
/// deployment and is linked in release builds; this build wires the
/// in-process store and logs when a configured address goes unused.
pub fn build_store(redis: &RedisConfig) -> Arc<dyn PlayerStore> {
    if !redis.addr.is_empty() {
        tracing::warn!(
            addr = %redis.addr,
            "external store not linked in this build, using in-process store"
        );
    }
    Arc::new(MemoryStore::new())
}

/// Cancels the root token on SIGINT or SIGTERM.
pub async fn shutdown_on_signal(cancel: CancellationToken) {
    let interrupted = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(terminate) => terminate,
            Err(e) => {
                tracing::error!(error = %e, "sigterm handler failed, ctrl-c only");
                let _ = interrupted.await;
                cancel.cancel();
                return;
            }
        };
        tokio::select! {
            _ = interrupted => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = interrupted.await;
    }
    tracing::info!("shutdown signal received");
    cancel.cancel();
}

/// Reads the config path from argv; `None` means run on defaults.
pub fn config_path_from_args() -> Option<String> {
    std::env::args().nth(1)
}
