//! Bounded worker pool for dispatch jobs.
//!
//! `dispatch()` only enqueues. A fixed number of worker tasks drain the queue
//! and run the handler, so the HTTP response never waits on downstream work
//! and the number of in-flight handler invocations stays bounded.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::handler::{HandlerError, MessageHandler};
use super::types::DispatchJob;

/// Why a job was not accepted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch queue is full")]
    QueueFull,

    #[error("dispatcher is shut down")]
    Closed,
}

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Number of concurrent handler invocations
    pub workers: usize,
    /// Jobs that may wait for a free worker before new ones are dropped
    pub queue_capacity: usize,
    /// Optional per-job deadline
    pub handler_timeout: Option<Duration>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            handler_timeout: None,
        }
    }
}

/// Cheap, cloneable entry point for enqueueing jobs.
#[derive(Clone)]
pub struct Dispatcher {
    sender: mpsc::Sender<DispatchJob>,
}

/// The running workers. Join after every [`Dispatcher`] clone is dropped.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the worker pool for `handler`.
    pub fn start<H: MessageHandler>(handler: H, options: DispatcherOptions) -> (Self, WorkerPool) {
        let workers = options.workers.max(1);
        let (sender, receiver) = mpsc::channel(options.queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);

        let handles = (0..workers)
            .map(|worker_id| {
                let receiver = Arc::clone(&receiver);
                let handler = Arc::clone(&handler);
                tokio::spawn(run_worker(worker_id, receiver, handler, options.handler_timeout))
            })
            .collect();

        info!(
            workers = workers,
            queue_capacity = options.queue_capacity,
            handler_timeout_secs = options.handler_timeout.map(|t| t.as_secs()),
            "dispatcher_started"
        );

        (Self { sender }, WorkerPool { workers: handles })
    }

    /// Enqueue a job without waiting.
    ///
    /// A full queue drops the job rather than stall the caller.
    pub fn dispatch(&self, job: DispatchJob) -> Result<(), DispatchError> {
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(
                    sender_id = %job.sender_id,
                    message_type_code = job.message_type_code,
                    "dispatch_queue_full"
                );
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("dispatch_queue_closed");
                Err(DispatchError::Closed)
            }
        }
    }
}

impl WorkerPool {
    /// Wait for the workers to drain the queue and exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "dispatch_worker_panicked");
            }
        }
        info!("dispatcher_stopped");
    }
}

async fn run_worker<H: MessageHandler>(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<DispatchJob>>>,
    handler: Arc<H>,
    handler_timeout: Option<Duration>,
) {
    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };

        let Some(job) = job else {
            break;
        };

        let result = match handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, handler.handle(&job)).await {
                Ok(result) => result,
                Err(_) => Err(HandlerError::Timeout(limit)),
            },
            None => handler.handle(&job).await,
        };

        match result {
            Ok(()) => info!(
                worker_id = worker_id,
                sender_id = %job.sender_id,
                message_type_code = job.message_type_code,
                "dispatch_job_completed"
            ),
            Err(e) => error!(
                worker_id = worker_id,
                sender_id = %job.sender_id,
                message_type_code = job.message_type_code,
                error = %e,
                "dispatch_job_failed"
            ),
        }
    }
}
