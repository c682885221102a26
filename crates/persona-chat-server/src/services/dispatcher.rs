use flume::{bounded, Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::config::DispatcherConfig;
use crate::utils::error::ApiError;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of OS threads fed by a bounded queue.
///
/// Request tasks hand blocking work (uploads, model calls, file I/O) to the
/// pool and await the result, so the single-threaded runtime keeps serving
/// other requests meanwhile. A full queue suspends the submitting task.
#[derive(Clone)]
pub struct Dispatcher {
    sender: Sender<Job>,
}

impl Dispatcher {
    pub fn new(config: &DispatcherConfig) -> Result<Self, ApiError> {
        let (sender, receiver) = bounded::<Job>(config.queue_capacity.max(1));

        info!(
            "Initializing dispatcher: workers={}, queue={}",
            config.workers, config.queue_capacity
        );

        for worker_id in 0..config.workers.max(1) {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("dispatch-{}", worker_id))
                .spawn(move || Self::worker_loop(worker_id, receiver))
                .map_err(|e| {
                    ApiError::Internal(format!("Failed to spawn worker {}: {}", worker_id, e))
                })?;
        }

        Ok(Self { sender })
    }

    fn worker_loop(worker_id: usize, receiver: Receiver<Job>) {
        debug!("Dispatcher worker {} started", worker_id);

        // Ends once every sender (every Dispatcher clone) is gone
        while let Ok(job) = receiver.recv() {
            job();
        }

        debug!("Dispatcher worker {} shutting down (channel closed)", worker_id);
    }

    /// Run `job` on a worker and await its result.
    /// A panic inside the job becomes an `Internal` error for this caller only.
    pub async fn run<T, F>(&self, op: &'static str, job: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let wrapped: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|payload| {
                let reason = panic_message(payload.as_ref());
                error!("Job '{}' panicked: {}", op, reason);
                Err(ApiError::Internal(format!("{} panicked: {}", op, reason)))
            });

            // Receiver gone means the request was dropped; the work still ran
            if tx.send(result).is_err() {
                debug!("Result of '{}' discarded, requester went away", op);
            }
        });

        self.sender
            .send_async(wrapped)
            .await
            .map_err(|_| ApiError::Internal("dispatcher is shut down".to_string()))?;

        rx.await
            .map_err(|_| ApiError::Internal(format!("{} was dropped before completing", op)))?
    }

    /// Jobs waiting for a free worker
    pub fn queued(&self) -> usize {
        self.sender.len()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
