// Job Queue Port (durable hand-off between submission and worker)

use crate::domain::{ImportPayload, JobId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One unit of work on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: JobId,
    pub payload: ImportPayload,
}

impl QueueMessage {
    pub fn new(job_id: impl Into<String>, payload: ImportPayload) -> Self {
        Self {
            job_id: job_id.into(),
            payload,
        }
    }

    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, QueueError> {
        serde_json::from_str(raw).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// A dequeued message plus the broker-side handle needed to acknowledge it
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: QueueMessage,
    /// Exact bytes as stored by the broker (used to ack)
    pub raw: String,
}

/// Notifications published on the queue's event channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "job_id", rename_all = "snake_case")]
pub enum QueueEvent {
    Enqueued(JobId),
    Acknowledged(JobId),
}

impl QueueEvent {
    pub fn encode(&self) -> Result<String, QueueError> {
        serde_json::to_string(self).map_err(|e| QueueError::Serialization(e.to_string()))
    }
}

/// Queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is closed")]
    Closed,

    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Malformed queue message: {0}")]
    Serialization(String),

    #[error("Broker error: {0}")]
    Broker(String),
}

impl QueueError {
    /// Connection-class failures are retried by the adapter, never surfaced as job failures
    pub fn is_transient(&self) -> bool {
        matches!(self, QueueError::Connection(_))
    }
}

/// Durable work queue with at-least-once delivery
///
/// Consumers must tolerate seeing the same message twice.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append one unit of work
    async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError>;

    /// Take the next unit of work, waiting at most `wait` for one to arrive
    ///
    /// # Returns
    /// `None` if nothing arrived within `wait`
    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery so it is never redelivered
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Close the event-notification channel
    async fn close_events(&self) -> Result<(), QueueError>;

    /// Stop accepting work, wait for in-flight I/O, release the connection
    async fn close(&self) -> Result<(), QueueError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::{broadcast, Notify};

    /// In-process queue with the same delivery semantics as the broker adapter
    pub struct InMemoryJobQueue {
        pending: Mutex<VecDeque<String>>,
        in_flight: Mutex<Vec<String>>,
        available: Notify,
        events: Mutex<Option<broadcast::Sender<QueueEvent>>>,
        closed: AtomicBool,
        close_calls: AtomicUsize,
        fail_enqueue: AtomicBool,
    }

    impl Default for InMemoryJobQueue {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryJobQueue {
        pub fn new() -> Self {
            let (tx, _) = broadcast::channel(256);
            Self {
                pending: Mutex::new(VecDeque::new()),
                in_flight: Mutex::new(Vec::new()),
                available: Notify::new(),
                events: Mutex::new(Some(tx)),
                closed: AtomicBool::new(false),
                close_calls: AtomicUsize::new(0),
                fail_enqueue: AtomicBool::new(false),
            }
        }

        /// Subscribe to queue events (None once the channel is closed)
        pub fn subscribe(&self) -> Option<broadcast::Receiver<QueueEvent>> {
            self.events.lock().unwrap().as_ref().map(|tx| tx.subscribe())
        }

        /// Simulate a consumer crash: unacked messages go back to pending
        pub fn redeliver_in_flight(&self) -> usize {
            let mut in_flight = self.in_flight.lock().unwrap();
            let count = in_flight.len();
            let mut pending = self.pending.lock().unwrap();
            for raw in in_flight.drain(..) {
                pending.push_front(raw);
                self.available.notify_one();
            }
            count
        }

        /// Push a raw message as-is (for malformed-message tests)
        pub fn push_raw(&self, raw: impl Into<String>) {
            self.pending.lock().unwrap().push_back(raw.into());
            self.available.notify_one();
        }

        /// Make the next enqueues fail with a broker error
        pub fn set_fail_enqueue(&self, fail: bool) {
            self.fail_enqueue.store(fail, Ordering::SeqCst);
        }

        pub fn pending_len(&self) -> usize {
            self.pending.lock().unwrap().len()
        }

        pub fn in_flight_len(&self) -> usize {
            self.in_flight.lock().unwrap().len()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn events_closed(&self) -> bool {
            self.events.lock().unwrap().is_none()
        }

        pub fn close_calls(&self) -> usize {
            self.close_calls.load(Ordering::SeqCst)
        }

        fn publish(&self, event: QueueEvent) {
            if let Some(tx) = self.events.lock().unwrap().as_ref() {
                // No subscribers is fine
                let _ = tx.send(event);
            }
        }

        fn ensure_open(&self) -> Result<(), QueueError> {
            if self.is_closed() {
                return Err(QueueError::Closed);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl JobQueue for InMemoryJobQueue {
        async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError> {
            self.ensure_open()?;
            if self.fail_enqueue.load(Ordering::SeqCst) {
                return Err(QueueError::Broker("injected enqueue failure".to_string()));
            }
            let raw = message.encode()?;
            self.pending.lock().unwrap().push_back(raw);
            self.available.notify_one();
            self.publish(QueueEvent::Enqueued(message.job_id.clone()));
            Ok(())
        }

        async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
            let deadline = tokio::time::Instant::now() + wait;
            loop {
                self.ensure_open()?;
                let popped = self.pending.lock().unwrap().pop_front();
                if let Some(raw) = popped {
                    // Undecodable messages are dropped, never redelivered
                    let message = QueueMessage::decode(&raw)?;
                    self.in_flight.lock().unwrap().push(raw.clone());
                    return Ok(Some(Delivery { message, raw }));
                }
                if tokio::time::timeout_at(deadline, self.available.notified())
                    .await
                    .is_err()
                {
                    return Ok(None);
                }
            }
        }

        async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
            self.ensure_open()?;
            let mut in_flight = self.in_flight.lock().unwrap();
            if let Some(pos) = in_flight.iter().position(|raw| raw == &delivery.raw) {
                in_flight.remove(pos);
            }
            drop(in_flight);
            self.publish(QueueEvent::Acknowledged(delivery.message.job_id.clone()));
            Ok(())
        }

        async fn close_events(&self) -> Result<(), QueueError> {
            self.events.lock().unwrap().take();
            Ok(())
        }

        async fn close(&self) -> Result<(), QueueError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
