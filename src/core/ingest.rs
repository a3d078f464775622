//! Ingestion loop: the single consumer of the inbound event queue

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use tokio::sync::{mpsc, watch};

use crate::core::client::Client;
use crate::core::event::Event;
use crate::core::message_handler::MessageRouter;
use crate::core::thread_pool::TaskPool;
use crate::metrics::ChatMetrics;

/// An event waiting to be routed, with the client that sent it
pub struct InboundEvent {
    pub from: Option<Arc<Client>>,
    pub event: Event,
    pub received_at: Instant,
}

impl InboundEvent {
    pub fn new(from: Option<Arc<Client>>, event: Event) -> Self {
        Self { from, event, received_at: Instant::now() }
    }
}

/// Drain `inbound` into the task pool until the queue closes or `shutdown`
/// flips. Submitting blocks while the pool is saturated, which in turn fills
/// the inbound queue and slows the sessions feeding it.
///
/// The receiver is handed back so the caller decides when the queue closes.
pub async fn run_ingestion(
    mut inbound: mpsc::Receiver<InboundEvent>,
    pool: Arc<TaskPool>,
    router: Arc<MessageRouter>,
    metrics: ChatMetrics,
    mut shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<InboundEvent> {
    info!("Ingestion loop started");

    while !*shutdown.borrow() {
        let next = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            next = inbound.recv() => next,
        };

        let Some(InboundEvent { from, event, received_at }) = next else {
            debug!("Inbound queue closed");
            break;
        };

        let router = router.clone();
        let metrics = metrics.clone();
        let job = async move {
            let kind = event.kind().to_string();
            router.route(from.as_ref(), event).await;
            metrics.observe_latency(&kind, received_at.elapsed()).await;
        };

        if let Err(e) = pool.submit(job).await {
            warn!("Dropping inbound event, task pool unavailable: {}", e);
            break;
        }
    }

    info!("Ingestion loop stopped");
    inbound
}
