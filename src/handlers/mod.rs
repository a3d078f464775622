//! HTTP routes: WebSocket upgrade, health, metrics and static files

pub mod websocket;

use std::convert::Infallible;

use log::{error, info};
use serde_json::json;
use warp::filters::BoxedFilter;
use warp::{Filter, Rejection, Reply};

use crate::constants::WS_PATH;
use crate::core::server::SharedServerManager;

pub use websocket::handle_ws_client;

fn with_server(server: SharedServerManager) -> impl Filter<Extract = (SharedServerManager,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

async fn health(server: SharedServerManager) -> Result<impl Reply, Rejection> {
    let rooms = server.rooms();
    Ok(warp::reply::json(&json!({
        "status": if server.is_shutting_down() { "shutting_down" } else { "ok" },
        "rooms": rooms.room_count().await,
        "clients": rooms.client_count().await,
    })))
}

async fn metrics(server: SharedServerManager) -> Result<impl Reply, Rejection> {
    match server.metrics().export("prometheus").await {
        Ok(text) => Ok(warp::reply::with_status(text, warp::http::StatusCode::OK)),
        Err(e) => {
            error!("Failed to export metrics: {}", e);
            Ok(warp::reply::with_status(
                String::new(),
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            ))
        }
    }
}

/// Every route the server exposes
pub fn routes(server: SharedServerManager) -> BoxedFilter<(Box<dyn Reply>,)> {
    let ws_route = warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        .and(with_server(server.clone()))
        .map(|ws: warp::ws::Ws, server: SharedServerManager| {
            let max_message_size = server.config().max_message_size;
            ws.max_message_size(max_message_size)
                .on_upgrade(move |socket| handle_ws_client(socket, server))
        });

    let health_route = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server.clone()))
        .and_then(health);

    let metrics_route = warp::path("metrics")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server.clone()))
        .and_then(metrics);

    let api = ws_route.or(health_route).or(metrics_route);

    match server.config().static_dir.clone() {
        Some(dir) => {
            info!("Serving static files from {}", dir);
            api.or(warp::fs::dir(dir))
                .map(|reply| Box::new(reply) as Box<dyn Reply>)
                .boxed()
        }
        None => api.map(|reply| Box::new(reply) as Box<dyn Reply>).boxed(),
    }
}
