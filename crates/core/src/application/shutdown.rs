// Shutdown Coordinator
// Ordered teardown: stop consumption, drain the worker, then release the queue

use crate::application::worker::ShutdownSender;
use crate::error::{AppError, Result};
use crate::port::JobQueue;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct ShutdownCoordinator {
    worker_shutdown: ShutdownSender,
    worker_handle: JoinHandle<Result<()>>,
    queue: Arc<dyn JobQueue>,
}

impl ShutdownCoordinator {
    pub fn new(
        worker_shutdown: ShutdownSender,
        worker_handle: JoinHandle<Result<()>>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            worker_shutdown,
            worker_handle,
            queue,
        }
    }

    /// Run the shutdown sequence
    ///
    /// 1. Signal the worker and wait, without a timeout, for in-flight jobs
    /// 2. Close the queue's event channel
    /// 3. Close the queue connection
    ///
    /// The queue is closed even when the worker ended with an error; the first
    /// error encountered is returned.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutdown requested, stopping job consumption");
        self.worker_shutdown.shutdown();

        let worker_result = match self.worker_handle.await {
            Ok(result) => result,
            Err(join_err) => Err(AppError::Internal(format!(
                "worker task failed: {}",
                join_err
            ))),
        };
        match &worker_result {
            Ok(()) => info!("Worker drained"),
            Err(e) => error!(error = %e, "Worker ended with an error"),
        }

        let events_result = self.queue.close_events().await.map_err(AppError::from);
        if let Err(e) = &events_result {
            error!(error = %e, "Failed to close queue event channel");
        }

        let close_result = self.queue.close().await.map_err(AppError::from);
        if let Err(e) = &close_result {
            error!(error = %e, "Failed to close queue connection");
        } else {
            info!("Queue connection closed");
        }

        worker_result.and(events_result).and(close_result)
    }
}
