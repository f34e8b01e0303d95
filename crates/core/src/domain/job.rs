// Import Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::progress::{ImportResult, ProgressUpdate};

/// Job ID (UUID v4)
pub type JobId = String;

/// Job Status
///
/// Forward-only: `Queued -> Running -> {Done | Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    /// `Done` and `Error` accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Queued | JobStatus::Running, JobStatus::Done | JobStatus::Error) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

/// What the pipeline routine needs to import one playlist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    pub playlist_url: String,
}

impl ImportPayload {
    pub fn new(playlist_url: impl Into<String>) -> Self {
        Self {
            playlist_url: playlist_url.into(),
        }
    }
}

/// Import Job Entity
///
/// `result` is set only in `Done`, `error` only in `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportJob {
    pub id: JobId,
    pub status: JobStatus,

    pub created_at: i64, // epoch ms
    pub updated_at: i64, // epoch ms

    pub progress: ProgressUpdate,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportJob {
    /// Create a new queued job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            created_at,
            updated_at: created_at,
            progress: ProgressUpdate::default(),
            result: None,
            error: None,
        }
    }

    fn transition(&mut self, next: JobStatus, now_millis: i64) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Transition to Running with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Running, now_millis)
    }

    /// Transition to Done with explicit timestamp
    pub fn complete(&mut self, result: ImportResult, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Done, now_millis)?;
        self.result = Some(result);
        Ok(())
    }

    /// Transition to Error with explicit timestamp
    pub fn fail(&mut self, message: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(JobStatus::Error, now_millis)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Replace the progress snapshot.
    ///
    /// Rejected when the job is terminal, when the update is internally
    /// inconsistent, or when any counter would go backwards.
    pub fn record_progress(&mut self, progress: ProgressUpdate, now_millis: i64) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: "progress".to_string(),
            });
        }
        if !progress.is_consistent() {
            return Err(DomainError::InconsistentProgress(format!("{:?}", progress)));
        }
        if progress.regresses_from(&self.progress) {
            return Err(DomainError::InconsistentProgress(format!(
                "{:?} is behind {:?}",
                progress, self.progress
            )));
        }
        self.progress = progress;
        self.updated_at = now_millis;
        Ok(())
    }
}
