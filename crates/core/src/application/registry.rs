// Job Registry - in-memory source of truth for job state
//
// Not persisted across restarts. Terminal records are evicted once the
// retention window has elapsed.

use crate::domain::{DomainError, ImportJob, ImportResult, JobId, ProgressUpdate};
use crate::port::{IdProvider, ProgressSink, TimeProvider};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Terminal jobs stay readable for one hour
pub const DEFAULT_RETENTION_WINDOW: Duration = Duration::from_secs(60 * 60);

/// How long a terminal job stays readable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub window: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            window: DEFAULT_RETENTION_WINDOW,
        }
    }
}

impl RetentionPolicy {
    fn window_millis(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

struct Entry {
    job: ImportJob,
    /// Set on terminal entry; the record is gone from `now >= expires_at`
    expires_at: Option<i64>,
}

impl Entry {
    fn is_expired(&self, now_millis: i64) -> bool {
        self.expires_at.is_some_and(|deadline| now_millis >= deadline)
    }
}

/// Job registry
///
/// All operations are synchronous and never touch external I/O. Mutations
/// against unknown or expired ids are silent no-ops.
pub struct JobRegistry {
    entries: RwLock<HashMap<JobId, Entry>>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    retention: RetentionPolicy,
    last_stamp: AtomicI64,
}

impl JobRegistry {
    pub fn new(
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            id_provider,
            time_provider,
            retention,
            last_stamp: AtomicI64::new(i64::MIN),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Create a queued job with zeroed progress
    pub fn create(&self) -> ImportJob {
        let id = self.id_provider.generate_id();
        let job = ImportJob::new(id.clone(), self.stamp());

        self.write().insert(
            id.clone(),
            Entry {
                job: job.clone(),
                expires_at: None,
            },
        );

        debug!(job_id = %id, "Job created");
        job
    }

    /// Read-only lookup. Expired records are reported as absent.
    pub fn get(&self, id: &str) -> Option<ImportJob> {
        let now = self.time_provider.now_millis();
        {
            let entries = self.read();
            match entries.get(id) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.job.clone()),
                Some(_) => {}
            }
        }

        let mut entries = self.write();
        if entries.get(id).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(id);
            debug!(job_id = %id, "Expired job evicted on read");
        }
        None
    }

    /// `queued -> running`
    pub fn set_running(&self, id: &str) {
        self.mutate(id, "set_running", |job, at| job.start(at));
    }

    /// Replace the progress snapshot (ignored once terminal)
    pub fn update_progress(&self, id: &str, progress: ProgressUpdate) {
        self.mutate(id, "update_progress", |job, at| {
            job.record_progress(progress, at)
        });
    }

    /// Terminal success; schedules removal after the retention window
    pub fn set_done(&self, id: &str, result: ImportResult) {
        self.mutate(id, "set_done", |job, at| job.complete(result, at));
    }

    /// Terminal failure; schedules removal after the retention window
    pub fn set_error(&self, id: &str, message: impl Into<String>) {
        let message = message.into();
        self.mutate(id, "set_error", |job, at| job.fail(message, at));
    }

    /// Drop every expired record
    ///
    /// # Returns
    /// Number of records removed
    pub fn purge_expired(&self) -> usize {
        let now = self.time_provider.now_millis();
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            info!(removed, remaining = entries.len(), "Purged expired jobs");
        }
        removed
    }

    /// Number of records held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn mutate<F>(&self, id: &str, op: &'static str, apply: F)
    where
        F: FnOnce(&mut ImportJob, i64) -> crate::domain::error::Result<()>,
    {
        let now = self.time_provider.now_millis();
        let mut entries = self.write();

        let expired = match entries.get(id) {
            None => {
                debug!(job_id = %id, op, "Ignoring mutation for unknown job");
                return;
            }
            Some(entry) => entry.is_expired(now),
        };
        if expired {
            entries.remove(id);
            debug!(job_id = %id, op, "Ignoring mutation for expired job");
            return;
        }

        let at = self.stamp();
        let window = self.retention.window_millis();
        let Some(entry) = entries.get_mut(id) else {
            return;
        };

        match apply(&mut entry.job, at) {
            Ok(()) => {
                if entry.job.status.is_terminal() && entry.expires_at.is_none() {
                    entry.expires_at = Some(at.saturating_add(window));
                    debug!(
                        job_id = %id,
                        status = %entry.job.status,
                        expires_at = at.saturating_add(window),
                        "Job reached terminal status"
                    );
                }
            }
            Err(DomainError::InconsistentProgress(detail)) => {
                warn!(job_id = %id, op, detail = %detail, "Dropping progress update");
            }
            Err(e) => {
                debug!(job_id = %id, op, error = %e, "Ignoring non-forward mutation");
            }
        }
    }

    /// Strictly increasing timestamp (epoch ms), even within one millisecond
    fn stamp(&self) -> i64 {
        let now = self.time_provider.now_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now.max(previous.saturating_add(1))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for JobRegistry {
    fn publish(&self, job_id: &JobId, update: ProgressUpdate) {
        self.update_progress(job_id, update);
    }
}
