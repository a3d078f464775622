//! Server service that wires the engine together and owns its lifecycle

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::core::client::Client;
use crate::core::event::{Event, RoomName};
use crate::core::ingest::{run_ingestion, InboundEvent};
use crate::core::message_handler::MessageRouter;
use crate::core::rate_limiter::RateLimiter;
use crate::core::room::RoomManager;
use crate::core::thread_pool::TaskPool;
use crate::error::{ChatroomError, Result};
use crate::metrics::ChatMetrics;
use crate::storage::LeaderboardRepository;

/// Owns the room engine, the router, the admission controller, the task pool
/// and the ingestion loop. Sessions talk to the engine only through this.
pub struct ServerManager {
    config: ServerConfig,
    rooms: Arc<RoomManager>,
    router: Arc<MessageRouter>,
    rate_limiter: Arc<RateLimiter>,
    pool: Arc<TaskPool>,
    leaderboard: Arc<dyn LeaderboardRepository>,
    metrics: ChatMetrics,
    inbound: mpsc::Sender<InboundEvent>,
    shutdown: watch::Sender<bool>,
    ingestion: Mutex<Option<JoinHandle<mpsc::Receiver<InboundEvent>>>>,
    cleanup: Mutex<Option<JoinHandle<()>>>,
}

impl ServerManager {
    /// Build every component and start the background tasks.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: ServerConfig,
        leaderboard: Arc<dyn LeaderboardRepository>,
        metrics: ChatMetrics,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let rooms = Arc::new(RoomManager::new(
            config.default_room.as_str(),
            config.history_max_size,
            metrics.clone(),
        ));
        let router = Arc::new(MessageRouter::new(rooms.clone(), leaderboard.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_max_messages,
            config.rate_limit_window,
            config.rate_limit_enabled,
        ));
        let pool = Arc::new(TaskPool::new(config.worker_count, config.queue_depth)?);

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (inbound, inbound_rx) = mpsc::channel(config.inbound_queue_depth);

        let cleanup = rate_limiter.clone().start_cleanup_task(shutdown_rx.clone());
        let ingestion = tokio::spawn(run_ingestion(
            inbound_rx,
            pool.clone(),
            router.clone(),
            metrics.clone(),
            shutdown_rx,
        ));

        info!(
            "Room engine started: {} workers, queue depth {}, default room {}",
            config.worker_count, config.queue_depth, config.default_room
        );

        Ok(Arc::new(Self {
            config,
            rooms,
            router,
            rate_limiter,
            pool,
            leaderboard,
            metrics,
            inbound,
            shutdown,
            ingestion: Mutex::new(Some(ingestion)),
            cleanup: Mutex::new(Some(cleanup)),
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn leaderboard(&self) -> &Arc<dyn LeaderboardRepository> {
        &self.leaderboard
    }

    pub fn metrics(&self) -> &ChatMetrics {
        &self.metrics
    }

    pub fn default_room(&self) -> RoomName {
        self.rooms.default_room().clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Subscribe to the shutdown signal
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Admission check for one inbound frame
    pub async fn check_rate_limit(&self, key: &str) -> bool {
        if self.rate_limiter.allow(key).await {
            return true;
        }
        self.metrics.rate_limited().await;
        warn!("Rate limit exceeded for {}", key);
        false
    }

    /// Queue an event for routing, waiting while the inbound queue is full
    pub async fn submit(&self, from: Option<Arc<Client>>, event: Event) -> Result<()> {
        if self.is_shutting_down() {
            return Err(ChatroomError::PoolClosed);
        }
        self.inbound
            .send(InboundEvent::new(from, event))
            .await
            .map_err(|_| ChatroomError::PoolClosed)
    }

    /// Stop the ingestion loop, drain the task pool, close the inbound
    /// queue and disconnect every client. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown.send_replace(true) {
            return Ok(());
        }
        info!("Shutting down room engine");

        let inbound = match self.ingestion.lock().await.take() {
            Some(handle) => match handle.await {
                Ok(receiver) => Some(receiver),
                Err(e) => {
                    warn!("Ingestion loop ended abnormally: {}", e);
                    None
                }
            },
            None => None,
        };

        self.pool.stop().await?;
        drop(inbound);

        if let Some(cleanup) = self.cleanup.lock().await.take() {
            if let Err(e) = cleanup.await {
                warn!("Rate limiter cleanup task ended abnormally: {}", e);
            }
        }

        for client in self.rooms.all_clients().await {
            if let Err(e) = client.close().await {
                if !e.is_disconnect() {
                    warn!("Failed to close connection of {}: {}", client.nickname, e);
                }
            }
        }

        info!("Room engine stopped");
        Ok(())
    }
}

/// Shared server handle
pub type SharedServerManager = Arc<ServerManager>;
