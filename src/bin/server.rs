use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info, warn};

use rusty_rooms::config::ServerConfig;
use rusty_rooms::core::server::ServerManager;
use rusty_rooms::handlers::routes;
use rusty_rooms::metrics::ChatMetrics;
use rusty_rooms::storage::FileLeaderboardRepository;

#[tokio::main]
async fn main() {
    // Load .env before the logger so RUST_LOG from the file applies
    let dotenv_result = dotenvy::dotenv();

    env_logger::init();

    match dotenv_result {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("No .env file loaded: {}", e),
    }

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Configuration: host={}, port={}", config.host, config.port);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let leaderboard = Arc::new(FileLeaderboardRepository::open(&config.leaderboard_file).await);
    let shutdown_timeout = config.shutdown_timeout;

    let server = match ServerManager::start(config, leaderboard, ChatMetrics::in_memory()) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start room engine: {}", e);
            std::process::exit(1);
        }
    };

    let mut http_stop = server.shutdown_signal();
    let bound = warp::serve(routes(server.clone())).try_bind_with_graceful_shutdown(addr, async move {
        let _ = http_stop.wait_for(|stopping| *stopping).await;
    });

    let (bound_addr, http) = match bound {
        Ok(bound) => bound,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    info!("Starting Rusty Rooms server on {}", bound_addr);

    let http = tokio::spawn(http);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");

    let stopping = async {
        if let Err(e) = server.shutdown().await {
            error!("Room engine shutdown failed: {}", e);
        }
        if let Err(e) = http.await {
            error!("HTTP server task failed: {}", e);
        }
    };

    if tokio::time::timeout(shutdown_timeout, stopping).await.is_err() {
        warn!("Shutdown did not finish within {:?}", shutdown_timeout);
    }
    info!("Server stopped");
}
