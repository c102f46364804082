//! The Game node binary.

use std::process::ExitCode;

use palisade::config::{self, GameFileConfig};
use palisade_game::GameServer;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    palisade::init_tracing();

    let file_config = match palisade::config_path_from_args() {
        Some(path) => match config::load::<GameFileConfig>(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "game startup failed");
                return ExitCode::FAILURE;
            }
        },
        None => GameFileConfig::default(),
    };

    let store = palisade::build_store(&file_config.redis);

    let cancel = CancellationToken::new();
    tokio::spawn(palisade::shutdown_on_signal(cancel.clone()));

    let server = GameServer::new(file_config.into_game_config(), store);
    match server.run(cancel).await {
        Ok(()) => {
            tracing::info!("game exited cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "game startup failed");
            ExitCode::FAILURE
        }
    }
}
