use anyhow::Result;
use api_server::{AppState, build_caches, run_api_server};
use common::Config;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = api_server::logging_stdout();
    dotenv().ok();

    let config = Config::from_env()?;
    info!(
        data_dir = %config.data_dir.display(),
        caches = config.caches.len(),
        "starting"
    );
    if config.caches.is_empty() {
        warn!("no caches configured, set CACHES=name=url-template,...");
    }

    let shutdown = CancellationToken::new();
    let state = AppState::new(build_caches(&config)?, shutdown.clone())?;
    state.registry().initialize_all(&shutdown).await;

    info!(addr = %config.api_addr, "api server listening");
    tokio::select! {
        result = run_api_server(config.api_addr, state.clone()) => {
            if let Err(e) = result {
                error!(error = %e, "api server stopped");
            }
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        }
    }

    shutdown.cancel();
    if !state.registry().flush_all(config.shutdown_grace).await {
        warn!("some caches were not flushed before shutdown");
    }
    Ok(())
}
