use std::process::ExitCode;

use comfydash::{termination_signal, Config, Orchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    log::info!("[Startup] Project root: {}", config.root_dir.display());
    log::info!(
        "[Startup] Dashboard port: {} | Backend port: {}",
        config.port,
        config.api_port
    );

    match Orchestrator::new(config).run(termination_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("[Startup] {}", e);
            ExitCode::FAILURE
        }
    }
}
