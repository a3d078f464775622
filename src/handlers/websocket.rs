//! WebSocket transport adapter for the room engine

use std::time::Duration;

use async_trait::async_trait;
use futures_util::sink::SinkExt;
use futures_util::stream::{SplitSink, SplitStream, StreamExt};
use log::{debug, info};
use warp::ws::{Message, WebSocket};

use crate::core::connection::{EventSink, EventStream};
use crate::core::event::Event;
use crate::core::server::SharedServerManager;
use crate::core::session::run_session;
use crate::error::{ChatroomError, Result};

/// Write half of a WebSocket; every write is bounded by `write_wait`
pub struct WsSink {
    tx: SplitSink<WebSocket, Message>,
    write_wait: Duration,
}

impl WsSink {
    pub fn new(tx: SplitSink<WebSocket, Message>, write_wait: Duration) -> Self {
        Self { tx, write_wait }
    }

    async fn write(&mut self, message: Message) -> Result<()> {
        match tokio::time::timeout(self.write_wait, self.tx.send(message)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ChatroomError::ConnectionError(e.to_string())),
            Err(_) => Err(ChatroomError::ConnectionError(format!(
                "write timed out after {:?}",
                self.write_wait
            ))),
        }
    }
}

#[async_trait]
impl EventSink for WsSink {
    async fn send(&mut self, event: &Event) -> Result<()> {
        let json = event.to_json()?;
        self.write(Message::text(json)).await
    }

    async fn ping(&mut self) -> Result<()> {
        self.write(Message::ping(Vec::new())).await
    }

    async fn close(&mut self) -> Result<()> {
        self.tx
            .close()
            .await
            .map_err(|e| ChatroomError::ConnectionError(e.to_string()))
    }
}

/// Read half of a WebSocket. Any frame, pongs included, proves the peer is
/// alive; silence for `pong_wait` ends the stream with an error.
pub struct WsStream {
    rx: SplitStream<WebSocket>,
    pong_wait: Duration,
}

impl WsStream {
    pub fn new(rx: SplitStream<WebSocket>, pong_wait: Duration) -> Self {
        Self { rx, pong_wait }
    }
}

#[async_trait]
impl EventStream for WsStream {
    async fn receive(&mut self) -> Result<Option<Event>> {
        loop {
            let frame = match tokio::time::timeout(self.pong_wait, self.rx.next()).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return Err(ChatroomError::ConnectionError(e.to_string())),
                Ok(None) => return Ok(None),
                Err(_) => {
                    return Err(ChatroomError::ConnectionError(format!(
                        "no frame received for {:?}",
                        self.pong_wait
                    )))
                }
            };

            if frame.is_close() {
                return Ok(None);
            }
            if frame.is_text() {
                let text = frame
                    .to_str()
                    .map_err(|_| ChatroomError::MessageParseError("invalid text frame".to_string()))?;
                return Event::parse(text).map(Some);
            }
            if frame.is_binary() {
                return Ok(Some(serde_json::from_slice(frame.as_bytes())?));
            }
            // Ping and pong frames only refresh the keep-alive window
        }
    }
}

/// Run a session over an upgraded WebSocket
pub async fn handle_ws_client(ws: WebSocket, server: SharedServerManager) {
    let (tx, rx) = ws.split();
    let config = server.config();
    let sink = WsSink::new(tx, config.write_wait);
    let stream = WsStream::new(rx, config.pong_wait);

    info!("WebSocket connection established");
    run_session(server.clone(), Box::new(sink), stream).await;
    debug!("WebSocket connection finished");
}
