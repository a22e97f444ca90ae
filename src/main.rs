use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use snake_duel_server::config::ServerConfig;
use snake_duel_server::metrics::{self, Metrics};
use snake_duel_server::net::game_session::{self, GameSession};
use snake_duel_server::net::transport::WebTransportServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Snake Duel Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    info!(
        "Configuration loaded: {}:{}, tick={:?}, match={:?}, rematch delay={:?}",
        config.bind_address,
        config.port,
        config.tick_interval,
        config.match_duration,
        config.rematch_delay
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_port = config.metrics_port;
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let session = GameSession::from_config(&config, metrics.clone()).shared();
    let server = WebTransportServer::new(config.clone(), session.clone(), metrics.clone()).await?;

    info!("Server ready on https://{}", server.bind_addr());
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {:#}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    game_session::shutdown(&session).await;
    info!("Server stopped");

    Ok(())
}
