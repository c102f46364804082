//! The Gate node binary.

use std::process::ExitCode;

use palisade::config::{self, GateFileConfig};
use palisade_gate::{Gate, GateServer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    palisade::init_tracing();

    let file_config = match palisade::config_path_from_args() {
        Some(path) => match config::load::<GateFileConfig>(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "gate startup failed");
                return ExitCode::FAILURE;
            }
        },
        None => GateFileConfig::default(),
    };

    let cancel = CancellationToken::new();
    tokio::spawn(palisade::shutdown_on_signal(cancel.clone()));

    let gate = Gate::new(file_config.into_gate_config());
    match GateServer::new(gate).run(cancel).await {
        Ok(()) => {
            tracing::info!("gate exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "gate startup failed");
            ExitCode::FAILURE
        }
    }
}
