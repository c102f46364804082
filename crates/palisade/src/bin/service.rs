//! The Service node binary.

use std::process::ExitCode;
use std::sync::Arc;

use palisade::config::{self, ServiceFileConfig};
use palisade_service::{NetServer, modules};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    palisade::init_tracing();

    let file_config = match palisade::config_path_from_args() {
        Some(path) => match config::load::<ServiceFileConfig>(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "service startup failed");
                return ExitCode::FAILURE;
            }
        },
        None => ServiceFileConfig::default(),
    };

    let store = palisade::build_store(&file_config.redis);
    // Duplicate module or msg-id registration aborts startup.
    let registry = match modules::default_registry(store) {
        Ok(registry) => registry,
        Err(e) => {
            tracing::error!(error = %e, "service startup failed");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(palisade::shutdown_on_signal(cancel.clone()));

    let server = Arc::new(NetServer::new(file_config.into_service_config(), registry));
    match server.run(cancel).await {
        Ok(()) => {
            tracing::info!("service exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "service startup failed");
            ExitCode::FAILURE
        }
    }
}
