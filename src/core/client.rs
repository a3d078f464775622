//! Connected client record

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::core::connection::EventSink;
use crate::core::event::{Event, RoomName};
use crate::error::{ChatroomError, Result};

/// A joined client. Owns the write half of its connection; rooms only
/// reference it.
pub struct Client {
    pub id: String,
    pub nickname: String,
    pub avatar: String,
    room: RwLock<RoomName>,
    /// Serializes every write on this connection
    sink: Mutex<Box<dyn EventSink>>,
    closed: AtomicBool,
    connected_at: Instant,
}

impl Client {
    pub fn new(
        nickname: impl Into<String>,
        avatar: impl Into<String>,
        room: RoomName,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            nickname: nickname.into(),
            avatar: avatar.into(),
            room: RwLock::new(room),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            connected_at: Instant::now(),
        }
    }

    /// Room the client is currently in
    pub async fn room(&self) -> RoomName {
        self.room.read().await.clone()
    }

    pub(crate) async fn set_room(&self, room: RoomName) {
        *self.room.write().await = room;
    }

    /// Write one event under the client's write lock.
    /// After a disconnect-style failure further writes fail fast.
    pub async fn send(&self, event: &Event) -> Result<()> {
        if self.is_closed() {
            return Err(ChatroomError::ConnectionClosed);
        }

        let mut sink = self.sink.lock().await;
        let result = sink.send(event).await;
        if let Err(ref e) = result {
            if e.is_disconnect() {
                self.closed.store(true, Ordering::Release);
            }
        }
        result
    }

    pub async fn ping(&self) -> Result<()> {
        if self.is_closed() {
            return Err(ChatroomError::ConnectionClosed);
        }
        self.sink.lock().await.ping().await
    }

    pub async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.sink.lock().await.close().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("nickname", &self.nickname)
            .finish()
    }
}
