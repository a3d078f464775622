// End-to-end tests against an in-process server bound to an ephemeral port

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rusty_rooms::config::ServerConfig;
use rusty_rooms::core::server::{ServerManager, SharedServerManager};
use rusty_rooms::handlers::routes;
use rusty_rooms::metrics::ChatMetrics;
use rusty_rooms::storage::MemoryLeaderboardRepository;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(config: ServerConfig) -> (SharedServerManager, SocketAddr) {
    let server = ServerManager::start(
        config,
        Arc::new(MemoryLeaderboardRepository::new()),
        ChatMetrics::in_memory(),
    )
    .unwrap();
    let (addr, serving) = warp::serve(routes(server.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serving);
    (server, addr)
}

async fn connect(addr: SocketAddr, init: Value) -> Socket {
    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    socket.send(Message::text(init.to_string())).await.unwrap();
    socket
}

/// Read frames until one of type `kind` arrives
async fn expect(socket: &mut Socket, kind: &str) -> Value {
    let wait = async {
        while let Some(frame) = socket.next().await {
            if let Ok(Message::Text(text)) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
        panic!("connection closed before a {} frame", kind);
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
}

#[tokio::test]
async fn test_chat_round_trip() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, json!({"nickname": "alice", "avatar": "🐱", "room": "den"})).await;
    expect(&mut alice, "join").await;
    let mut bob = connect(addr, json!({"nickname": "bob", "avatar": "🐶", "room": "den"})).await;
    let joined = expect(&mut alice, "join").await;
    assert_eq!(joined["content"], "bob joined the room");

    bob.send(Message::text(json!({"type": "chat", "content": "hi alice", "nickname": "mallory"}).to_string()))
        .await
        .unwrap();

    let chat = expect(&mut alice, "chat").await;
    assert_eq!(chat["content"], "hi alice");
    assert_eq!(chat["nickname"], "bob");
    assert_eq!(chat["room"], "den");
    assert!(chat["timestamp"].is_string());

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_history_replayed_to_late_joiner() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, json!({"nickname": "alice", "room": "den"})).await;
    expect(&mut alice, "join").await;
    alice
        .send(Message::text(json!({"type": "chat", "content": "first!"}).to_string()))
        .await
        .unwrap();
    expect(&mut alice, "chat").await;

    let mut bob = connect(addr, json!({"nickname": "bob", "room": "den"})).await;
    let replayed = expect(&mut bob, "chat").await;
    assert_eq!(replayed["content"], "first!");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wrong_init_password_falls_back_to_default_room() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut owner = connect(addr, json!({"nickname": "owner", "room": "vault", "password": "s3cret"})).await;
    expect(&mut owner, "join").await;

    let mut intruder = connect(addr, json!({"nickname": "intruder", "room": "vault", "password": "guess"})).await;
    let refused = expect(&mut intruder, "wrong_password").await;
    assert_eq!(refused["room"], "vault");
    let joined = expect(&mut intruder, "join").await;
    assert_eq!(joined["room"], "lobby");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_switch_room_confirms_previous_room() {
    let (server, addr) = start_server(ServerConfig::default()).await;

    let mut alice = connect(addr, json!({"nickname": "alice", "room": "den"})).await;
    expect(&mut alice, "join").await;
    alice
        .send(Message::text(json!({"type": "switch", "room": "attic"}).to_string()))
        .await
        .unwrap();

    let switched = expect(&mut alice, "switch_success").await;
    assert_eq!(switched["room"], "attic");
    assert_eq!(switched["content"], "den");

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rate_limited_sender_gets_error() {
    let config = ServerConfig { rate_limit_max_messages: 2, ..ServerConfig::default() };
    let (server, addr) = start_server(config).await;

    let mut alice = connect(addr, json!({"nickname": "alice", "room": "den", "userId": "u-1"})).await;
    expect(&mut alice, "join").await;
    for i in 0..3 {
        alice
            .send(Message::text(json!({"type": "chat", "content": format!("msg {}", i), "userId": "u-1"}).to_string()))
            .await
            .unwrap();
    }

    let error = expect(&mut alice, "error").await;
    assert!(error["content"].as_str().unwrap().contains("too fast"));

    server.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, addr) = start_server(ServerConfig::default()).await;
    let mut alice = connect(addr, json!({"nickname": "alice", "room": "den"})).await;
    expect(&mut alice, "join").await;

    let health: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["clients"], 1);

    let metrics = reqwest::get(format!("http://{}/metrics", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("connections"));

    server.shutdown().await.unwrap();
}
