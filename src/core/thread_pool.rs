//! Bounded task pool for routed message processing
//!
//! A fixed set of workers drains one shared job queue. `submit` waits for a
//! free slot when the queue is full, so a saturated pool slows the producer
//! instead of growing memory. `stop` closes the queue and waits until every
//! queued and in-flight job has finished.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use log::{debug, error, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ChatroomError, Result};

/// Opaque unit of work
pub type Job = BoxFuture<'static, ()>;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>;

pub struct TaskPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
    queue_depth: usize,
}

impl TaskPool {
    /// Spawn `worker_count` workers on the current runtime
    pub fn new(worker_count: usize, queue_depth: usize) -> Result<Self> {
        if worker_count == 0 || queue_depth == 0 {
            return Err(ChatroomError::SystemError(format!(
                "Task pool needs at least one worker and one queue slot (got {} workers, depth {})",
                worker_count, queue_depth
            )));
        }

        let (tx, rx) = mpsc::channel::<Job>(queue_depth);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

        let workers = (0..worker_count)
            .map(|worker_id| tokio::spawn(Self::worker_loop(worker_id, rx.clone())))
            .collect();

        info!(
            "Created task pool with {} workers and queue depth {}",
            worker_count, queue_depth
        );

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            worker_count,
            queue_depth,
        })
    }

    async fn worker_loop(worker_id: usize, rx: SharedReceiver) {
        loop {
            let job = {
                let mut receiver = rx.lock().await;
                receiver.recv().await
            };

            match job {
                Some(job) => {
                    // A panicking job must not take the worker down with it
                    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                        error!("Worker {} recovered from a panicking job", worker_id);
                    }
                }
                None => {
                    debug!("Worker {} shutting down", worker_id);
                    break;
                }
            }
        }
    }

    /// Queue a job, waiting while the queue is full
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = self.sender.lock()?.clone().ok_or(ChatroomError::PoolClosed)?;
        sender
            .send(job.boxed())
            .await
            .map_err(|_| ChatroomError::PoolClosed)
    }

    /// Close the queue and wait for every accepted job to finish
    pub async fn stop(&self) -> Result<()> {
        let sender = self.sender.lock()?.take();
        if sender.is_none() {
            return Ok(());
        }
        drop(sender);

        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock()?);
        for joined in join_all(workers).await {
            if let Err(e) = joined {
                error!("Task pool worker ended abnormally: {}", e);
            }
        }

        info!("Task pool stopped");
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth
    }

    /// Jobs waiting in the queue
    pub fn queued(&self) -> usize {
        match self.sender.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|s| s.max_capacity() - s.capacity())
                .unwrap_or(0),
            Err(_) => 0,
        }
    }
}

/// Shared task pool handle
pub type SharedTaskPool = Arc<TaskPool>;
