// Redis JobQueue Implementation
//
// Reliable-queue pattern over two lists:
//   enqueue  RPUSH  <prefix>:pending
//   dequeue  BLMOVE <prefix>:pending -> <prefix>:processing
//   ack      LREM   <prefix>:processing
// Units stranded in `processing` by a crash are moved back on connect.

use crate::connection::{connect_with_retry, map_redis_error, RedisSettings};
use async_trait::async_trait;
use playlist_import_core::application::worker::constants::{
    next_backoff, RECONNECT_BASE_DELAY,
};
use playlist_import_core::application::ShutdownToken;
use playlist_import_core::port::{Delivery, JobQueue, QueueError, QueueEvent, QueueMessage};
use redis::aio::ConnectionManager;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};

/// BLMOVE rejects a zero timeout as "block forever"
const MIN_BLOCK_SECS: f64 = 0.01;

/// Key names derived from one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    pub pending: String,
    pub processing: String,
    pub events: String,
}

impl QueueKeys {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches(':');
        Self {
            pending: format!("{}:pending", prefix),
            processing: format!("{}:processing", prefix),
            events: format!("{}:events", prefix),
        }
    }
}

struct Connections {
    /// Enqueue, ack, publish
    producer: ConnectionManager,
    /// Blocking BLMOVE only
    consumer: ConnectionManager,
}

pub struct RedisJobQueue {
    keys: QueueKeys,
    /// Readers are in-flight commands; `close` takes the write side
    conns: RwLock<Option<Connections>>,
    /// Flipped once by `close`; also wakes enqueues sleeping in a backoff
    closed: watch::Sender<bool>,
    events_open: AtomicBool,
}

impl RedisJobQueue {
    /// Connect (retrying until `shutdown`) and requeue units a previous process
    /// left unacknowledged
    pub async fn connect(
        settings: &RedisSettings,
        prefix: &str,
        shutdown: ShutdownToken,
    ) -> Result<Self, QueueError> {
        let producer = connect_with_retry(settings, shutdown.clone()).await?;
        let consumer = connect_with_retry(settings, shutdown).await?;

        let queue = Self {
            keys: QueueKeys::new(prefix),
            conns: RwLock::new(Some(Connections { producer, consumer })),
            closed: watch::channel(false).0,
            events_open: AtomicBool::new(true),
        };

        let recovered = queue.recover_in_flight().await?;
        if recovered > 0 {
            warn!(recovered, "Requeued unacknowledged jobs from a previous run");
        }
        Ok(queue)
    }

    /// Move everything in `processing` back to the head of `pending`, oldest first
    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let guard = self.conns.read().await;
        let conns = guard.as_ref().ok_or(QueueError::Closed)?;
        let mut conn = conns.producer.clone();

        let mut moved = 0;
        loop {
            let raw: Option<String> = redis::cmd("LMOVE")
                .arg(&self.keys.processing)
                .arg(&self.keys.pending)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            if raw.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    /// Queue depth as (pending, processing)
    pub async fn depth(&self) -> Result<(usize, usize), QueueError> {
        let guard = self.conns.read().await;
        let conns = guard.as_ref().ok_or(QueueError::Closed)?;
        let mut conn = conns.producer.clone();

        let pending: usize = redis::cmd("LLEN")
            .arg(&self.keys.pending)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        let processing: usize = redis::cmd("LLEN")
            .arg(&self.keys.processing)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok((pending, processing))
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if *self.closed.borrow() {
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    async fn push_once(&self, raw: &str) -> Result<(), QueueError> {
        let guard = self.conns.read().await;
        let conns = guard.as_ref().ok_or(QueueError::Closed)?;
        let mut conn = conns.producer.clone();

        let _len: i64 = redis::cmd("RPUSH")
            .arg(&self.keys.pending)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn remove_from_processing(&self, raw: &str) -> Result<i64, QueueError> {
        let guard = self.conns.read().await;
        let conns = guard.as_ref().ok_or(QueueError::Closed)?;
        let mut conn = conns.producer.clone();

        redis::cmd("LREM")
            .arg(&self.keys.processing)
            .arg(1)
            .arg(raw)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }

    /// Best effort: a lost event never fails the operation that caused it
    async fn publish(&self, event: QueueEvent) {
        if !self.events_open.load(Ordering::SeqCst) {
            return;
        }
        let payload = match encode_event(&event) {
            Some(payload) => payload,
            None => return,
        };

        let guard = self.conns.read().await;
        let Some(conns) = guard.as_ref() else {
            return;
        };
        let mut conn = conns.producer.clone();
        let published: Result<i64, _> = redis::cmd("PUBLISH")
            .arg(&self.keys.events)
            .arg(payload)
            .query_async(&mut conn)
            .await;
        if let Err(e) = published {
            debug!(error = %e, "Failed to publish queue event");
        }
    }
}

/// Run `attempt` until it succeeds or fails permanently, backing off between
/// transient failures. Gives up with `Closed` as soon as `closed` flips, even
/// mid-backoff.
async fn retry_until_closed<F, Fut>(
    mut closed: watch::Receiver<bool>,
    job_id: &str,
    mut attempt: F,
) -> Result<(), QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), QueueError>>,
{
    let mut delay = RECONNECT_BASE_DELAY;
    loop {
        if *closed.borrow() {
            return Err(QueueError::Closed);
        }
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() => {
                warn!(
                    job_id,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Enqueue failed on a broker outage, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = closed.wait_for(|closed| *closed) => return Err(QueueError::Closed),
                }
                delay = next_backoff(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

fn encode_event(event: &QueueEvent) -> Option<String> {
    match event.encode() {
        Ok(payload) => Some(payload),
        Err(e) => {
            error!(error = %e, "Failed to encode queue event");
            None
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, message: &QueueMessage) -> Result<(), QueueError> {
        let raw = message.encode()?;
        self.ensure_open()?;
        let raw = raw.as_str();
        retry_until_closed(self.closed.subscribe(), &message.job_id, move || {
            self.push_once(raw)
        })
        .await?;

        debug!(job_id = %message.job_id, "Job enqueued");
        self.publish(QueueEvent::Enqueued(message.job_id.clone())).await;
        Ok(())
    }

    async fn dequeue(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        self.ensure_open()?;

        let raw: Option<String> = {
            let guard = self.conns.read().await;
            let conns = guard.as_ref().ok_or(QueueError::Closed)?;
            let mut conn = conns.consumer.clone();

            redis::cmd("BLMOVE")
                .arg(&self.keys.pending)
                .arg(&self.keys.processing)
                .arg("LEFT")
                .arg("RIGHT")
                .arg(wait.as_secs_f64().max(MIN_BLOCK_SECS))
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?
        };

        let Some(raw) = raw else {
            return Ok(None);
        };

        match QueueMessage::decode(&raw) {
            Ok(message) => Ok(Some(Delivery { message, raw })),
            Err(e) => {
                // Undecodable units would be redelivered forever
                if let Err(remove_err) = self.remove_from_processing(&raw).await {
                    warn!(error = %remove_err, "Failed to drop malformed message");
                }
                Err(e)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let removed = self.remove_from_processing(&delivery.raw).await?;
        if removed == 0 {
            debug!(job_id = %delivery.message.job_id, "Ack found nothing in processing");
        }
        self.publish(QueueEvent::Acknowledged(delivery.message.job_id.clone()))
            .await;
        Ok(())
    }

    async fn close_events(&self) -> Result<(), QueueError> {
        if self.events_open.swap(false, Ordering::SeqCst) {
            info!(channel = %self.keys.events, "Queue event channel closed");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), QueueError> {
        self.closed.send_replace(true);
        // Waits for every command still holding a read guard
        let mut guard = self.conns.write().await;
        if guard.take().is_some() {
            info!("Redis connections released");
        }
        Ok(())
    }
}
