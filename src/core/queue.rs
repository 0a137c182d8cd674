//! FIFO serialization of outbound platform calls.
//!
//! Every `submit` enqueues immediately, so the order of `submit` calls is the
//! order of execution even when the returned futures are awaited out of order.
//! A single worker task drives one job at a time. A job that fails or panics
//! only affects its own caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::QueueError;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct RequestQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl RequestQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                    error!("Queued request panicked, continuing with next task");
                }
            }
            debug!("Request queue drained and closed");
        });

        RequestQueue { tx }
    }

    /// Append `task` to the queue. The task is not started until every task
    /// submitted before it has finished.
    pub fn submit<F, Fut, T>(&self, task: F) -> impl Future<Output = Result<T, QueueError>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let output = task().await;
            // Caller may have stopped waiting
            let _ = done_tx.send(output);
        });
        let enqueued = self.tx.send(job).map_err(|_| QueueError::Closed);

        async move {
            match enqueued {
                Ok(()) => done_rx.await.map_err(|_| QueueError::TaskPanicked),
                Err(e) => Err(e),
            }
        }
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}
