// Worker - Import execution loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::panic_message;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::registry::JobRegistry;
use crate::error::Result;
use crate::port::{
    Delivery, JobQueue, PlaylistImporter, ProgressReporter, ProgressSink, QueueError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Imports executed at once (at least 1)
    pub concurrency: usize,
    /// Upper bound of a single dequeue wait
    pub dequeue_wait: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dequeue_wait: DEFAULT_DEQUEUE_WAIT,
        }
    }
}

/// Worker drains the queue and is the only component that runs the pipeline routine
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    registry: Arc<JobRegistry>,
    importer: Arc<dyn PlaylistImporter>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        registry: Arc<JobRegistry>,
        importer: Arc<dyn PlaylistImporter>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            registry,
            importer,
            config,
        }
    }

    /// Run the consume loop until `shutdown` fires, then wait for in-flight jobs
    ///
    /// A job that has been dequeued always runs to a terminal status before
    /// this returns.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        let concurrency = self.config.concurrency.max(1);
        let permits = Arc::new(Semaphore::new(concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!(concurrency, "Worker started");
        loop {
            while let Some(joined) = in_flight.try_join_next() {
                log_join(joined);
            }
            if shutdown.is_shutdown() {
                break;
            }

            // Capacity first: a unit is only taken off the queue when it can start
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // A stop request abandons the wait; anything the broker moved
            // meanwhile stays unacked and is redelivered on the next start
            let dequeued = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                dequeued = self.queue.dequeue(self.config.dequeue_wait) => dequeued,
            };

            let delivery = match dequeued {
                Ok(Some(delivery)) if shutdown.is_shutdown() => {
                    info!(
                        job_id = %delivery.message.job_id,
                        "Stop requested, leaving delivery unacked"
                    );
                    break;
                }
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(QueueError::Closed) => {
                    warn!("Queue closed underneath the worker, stopping consumption");
                    break;
                }
                Err(e @ QueueError::Serialization(_)) => {
                    error!(error = %e, "Discarding malformed queue message");
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Dequeue failed");
                    drop(permit);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.cancelled() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                    continue;
                }
            };

            let queue = Arc::clone(&self.queue);
            let registry = Arc::clone(&self.registry);
            let importer = Arc::clone(&self.importer);
            in_flight.spawn(async move {
                let _permit = permit;
                execute_delivery(queue, registry, importer, delivery).await;
            });
        }

        if !in_flight.is_empty() {
            info!(in_flight = in_flight.len(), "Worker stopping, waiting for in-flight imports");
        }
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Dequeue and fully process at most one unit inline
    ///
    /// # Returns
    /// `true` if a job was processed
    pub async fn process_next_job(&self) -> Result<bool> {
        let delivery = match self.queue.dequeue(self.config.dequeue_wait).await? {
            Some(delivery) => delivery,
            None => return Ok(false),
        };
        execute_delivery(
            Arc::clone(&self.queue),
            Arc::clone(&self.registry),
            Arc::clone(&self.importer),
            delivery,
        )
        .await;
        Ok(true)
    }
}

/// Drive one delivery to a terminal status, then ack it
async fn execute_delivery(
    queue: Arc<dyn JobQueue>,
    registry: Arc<JobRegistry>,
    importer: Arc<dyn PlaylistImporter>,
    delivery: Delivery,
) {
    let job_id = delivery.message.job_id.clone();

    match registry.get(&job_id) {
        Some(job) if job.status.is_terminal() => {
            info!(
                job_id = %job_id,
                status = %job.status,
                "Skipping redelivered job that already finished"
            );
            ack(queue.as_ref(), &delivery).await;
            return;
        }
        Some(_) => {}
        None => {
            // Registry is not durable; the import itself still has to happen
            warn!(job_id = %job_id, "Job not in registry, running without status tracking");
        }
    }

    registry.set_running(&job_id);
    info!(
        job_id = %job_id,
        playlist_url = %delivery.message.payload.playlist_url,
        "Processing import job"
    );

    let sink: Arc<dyn ProgressSink> = registry.clone();
    let reporter = ProgressReporter::new(job_id.clone(), sink);
    let payload = delivery.message.payload.clone();

    // Spawned so a panicking pipeline fails the job, not the worker
    let handle = tokio::spawn(async move { importer.run(&payload, reporter).await });

    match handle.await {
        Ok(Ok(result)) => {
            registry.set_done(&job_id, result);
            info!(job_id = %job_id, "Import job completed");
        }
        Ok(Err(e)) => {
            warn!(job_id = %job_id, error = %e, "Import job failed");
            registry.set_error(&job_id, e.to_string());
        }
        Err(join_err) => {
            let message = if join_err.is_panic() {
                format!("pipeline panicked: {}", panic_message(join_err.into_panic()))
            } else {
                "pipeline task was cancelled".to_string()
            };
            error!(job_id = %job_id, error = %message, "Import job aborted");
            registry.set_error(&job_id, message);
        }
    }

    ack(queue.as_ref(), &delivery).await;
}

async fn ack(queue: &dyn JobQueue, delivery: &Delivery) {
    if let Err(e) = queue.ack(delivery).await {
        // Redelivery of a finished job is skipped, so a lost ack is harmless
        error!(job_id = %delivery.message.job_id, error = %e, "Failed to acknowledge delivery");
    } else {
        debug!(job_id = %delivery.message.job_id, "Delivery acknowledged");
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = ?e, "Job task ended abnormally");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::registry::RetentionPolicy;
    use crate::domain::{ImportPayload, JobStatus, ProgressUpdate};
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_queue::mocks::InMemoryJobQueue;
    use crate::port::pipeline::mocks::{Script, ScriptedImporter};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::QueueMessage;
    use serde_json::json;
    use tokio::sync::Notify;

    const PLAYLIST: &str = "https://example.com/playlist?list=abc";

    struct Harness {
        queue: Arc<InMemoryJobQueue>,
        registry: Arc<JobRegistry>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                queue: Arc::new(InMemoryJobQueue::new()),
                registry: Arc::new(JobRegistry::new(
                    Arc::new(SequentialIdProvider::default()),
                    Arc::new(SystemTimeProvider),
                    RetentionPolicy::default(),
                )),
            }
        }

        fn worker(&self, importer: Arc<ScriptedImporter>, concurrency: usize) -> Worker {
            Worker::new(
                self.queue.clone(),
                self.registry.clone(),
                importer,
                WorkerConfig {
                    concurrency,
                    dequeue_wait: Duration::from_millis(20),
                },
            )
        }

        async fn submit(&self, playlist_url: &str) -> String {
            let job = self.registry.create();
            self.queue
                .enqueue(&QueueMessage::new(job.id.clone(), ImportPayload::new(playlist_url)))
                .await
                .unwrap();
            job.id
        }
    }

    #[tokio::test]
    async fn test_successful_import() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new(Script::succeed(
            vec![ProgressUpdate::new(5, 2, 2, 0), ProgressUpdate::new(5, 5, 4, 1)],
            json!({"imported": 4, "failed": 1}),
        )));
        let id = h.submit(PLAYLIST).await;

        assert!(h.worker(importer, 1).process_next_job().await.unwrap());

        let job = h.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, ProgressUpdate::new(5, 5, 4, 1));
        assert_eq!(job.result.unwrap().as_value()["imported"], 4);
        assert_eq!(h.queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_failed_import_freezes_progress() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new(Script::fail(
            vec![ProgressUpdate::new(5, 3, 2, 1)],
            "source playlist is private",
        )));
        let id = h.submit(PLAYLIST).await;

        h.worker(importer.clone(), 1).process_next_job().await.unwrap();

        let job = h.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.error.as_deref(), Some("source playlist is private"));
        assert_eq!(job.progress, ProgressUpdate::new(5, 3, 2, 1));
        assert!(job.result.is_none());
        // No automatic retry
        assert_eq!(importer.call_count(), 1);
        assert_eq!(h.queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_panicking_pipeline_fails_job_not_worker() {
        let h = Harness::new();
        let importer = Arc::new(
            ScriptedImporter::new_success()
                .with_script_for("https://example.com/explodes", Script::panic("decoder exploded")),
        );
        let bad = h.submit("https://example.com/explodes").await;
        let good = h.submit(PLAYLIST).await;

        let worker = h.worker(importer, 1);
        assert!(worker.process_next_job().await.unwrap());
        assert!(worker.process_next_job().await.unwrap());

        let failed = h.registry.get(&bad).unwrap();
        assert_eq!(failed.status, JobStatus::Error);
        assert!(failed.error.unwrap().contains("decoder exploded"));
        assert_eq!(h.registry.get(&good).unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_redelivered_finished_job_is_skipped() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new_success());
        let id = h.submit(PLAYLIST).await;
        let worker = h.worker(importer.clone(), 1);

        worker.process_next_job().await.unwrap();
        let finished = h.registry.get(&id).unwrap();

        // Same message delivered again (at-least-once)
        h.queue
            .enqueue(&QueueMessage::new(id.clone(), ImportPayload::new(PLAYLIST)))
            .await
            .unwrap();
        worker.process_next_job().await.unwrap();

        assert_eq!(importer.call_count(), 1);
        assert_eq!(h.registry.get(&id).unwrap(), finished);
        assert_eq!(h.queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_unknown_job_still_runs_without_creating_record() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new_success());
        h.queue
            .enqueue(&QueueMessage::new("lost-on-restart", ImportPayload::new(PLAYLIST)))
            .await
            .unwrap();

        h.worker(importer.clone(), 1).process_next_job().await.unwrap();

        assert_eq!(importer.call_count(), 1);
        assert!(h.registry.get("lost-on-restart").is_none());
        assert!(h.registry.is_empty());
    }

    #[tokio::test]
    async fn test_run_drains_in_flight_job_on_stop() {
        let h = Harness::new();
        let gate = Arc::new(Notify::new());
        let importer = Arc::new(
            ScriptedImporter::new(Script::succeed(
                vec![ProgressUpdate::new(3, 1, 1, 0)],
                json!({"imported": 3}),
            ))
            .with_gate(gate.clone()),
        );
        let id = h.submit(PLAYLIST).await;
        let queued_behind = h.submit("https://example.com/second").await;

        let worker = h.worker(importer.clone(), 1);
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        importer.wait_started().await;
        assert_eq!(h.registry.get(&id).unwrap().status, JobStatus::Running);
        tx.shutdown();

        // Still mid-flight: run() must not have returned
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        gate.notify_one();
        handle.await.unwrap().unwrap();

        assert_eq!(h.registry.get(&id).unwrap().status, JobStatus::Done);
        // Nothing new was taken after the stop request
        assert_eq!(h.registry.get(&queued_behind).unwrap().status, JobStatus::Queued);
        assert_eq!(h.queue.pending_len(), 1);
        assert_eq!(importer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_during_idle_wait_takes_no_new_job() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new_success());
        let worker = Worker::new(
            h.queue.clone(),
            h.registry.clone(),
            importer.clone(),
            WorkerConfig {
                concurrency: 1,
                dequeue_wait: Duration::from_secs(1),
            },
        );
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        // Let the worker block on the empty queue
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let late = h.submit(PLAYLIST).await;

        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("stop must not wait out the dequeue")
            .unwrap()
            .unwrap();

        assert_eq!(h.registry.get(&late).unwrap().status, JobStatus::Queued);
        assert_eq!(importer.call_count(), 0);
        assert_eq!(h.queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_concurrency_one_serializes_jobs() {
        let h = Harness::new();
        let gate = Arc::new(Notify::new());
        let importer = Arc::new(ScriptedImporter::new_success().with_gate(gate.clone()));
        let first = h.submit(PLAYLIST).await;
        let second = h.submit("https://example.com/second").await;

        let worker = h.worker(importer.clone(), 1);
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        importer.wait_started().await;
        assert_eq!(h.registry.get(&second).unwrap().status, JobStatus::Queued);

        gate.notify_one();
        importer.wait_started().await;

        let first_job = h.registry.get(&first).unwrap();
        let second_job = h.registry.get(&second).unwrap();
        assert_eq!(first_job.status, JobStatus::Done);
        assert_eq!(second_job.status, JobStatus::Running);
        // second's updated_at is its running stamp here
        assert!(second_job.updated_at > first_job.updated_at);

        tx.shutdown();
        gate.notify_one();
        handle.await.unwrap().unwrap();
        assert_eq!(h.registry.get(&second).unwrap().status, JobStatus::Done);
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let h = Harness::new();
        let gate = Arc::new(Notify::new());
        let importer = Arc::new(ScriptedImporter::new_success().with_gate(gate.clone()));
        for i in 0..4 {
            h.submit(&format!("https://example.com/p{}", i)).await;
        }

        let worker = h.worker(importer.clone(), 2);
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        importer.wait_started().await;
        importer.wait_started().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(importer.call_count(), 2);
        assert_eq!(h.queue.pending_len(), 2);

        tx.shutdown();
        gate.notify_waiters();
        handle.await.unwrap().unwrap();
        assert_eq!(importer.call_count(), 2);
    }

    #[tokio::test]
    async fn test_malformed_message_does_not_stop_worker() {
        let h = Harness::new();
        let importer = Arc::new(ScriptedImporter::new_success());
        h.queue.push_raw("{not json");
        let id = h.submit(PLAYLIST).await;

        let worker = h.worker(importer, 1);
        let (tx, token) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(token).await });

        let registry = h.registry.clone();
        let job_id = id.clone();
        tokio::time::timeout(Duration::from_secs(5), async move {
            while !registry.get(&job_id).is_some_and(|job| job.status.is_terminal()) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("valid job after a malformed one should still run");

        tx.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(h.registry.get(&id).unwrap().status, JobStatus::Done);
    }
}
