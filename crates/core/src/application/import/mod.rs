// Import Service - submission and status use cases

pub mod submit;
mod submit_test;

pub use submit::{validate_request, ImportRequest, MAX_PLAYLIST_URL_LEN};

use crate::application::registry::JobRegistry;
use crate::domain::ImportJob;
use crate::error::Result;
use crate::port::JobQueue;
use std::sync::Arc;

/// Import Service
///
/// The submission path: owns creation of registry records and their hand-off
/// to the queue. Status reads go straight to the registry.
pub struct ImportService {
    registry: Arc<JobRegistry>,
    queue: Arc<dyn JobQueue>,
}

impl ImportService {
    pub fn new(registry: Arc<JobRegistry>, queue: Arc<dyn JobQueue>) -> Self {
        Self { registry, queue }
    }

    /// Validate, create a `queued` job, enqueue it
    pub async fn submit(&self, req: ImportRequest) -> Result<ImportJob> {
        submit::execute(self.registry.as_ref(), self.queue.as_ref(), req).await
    }

    /// `None` means absent or expired, never "in progress"
    pub fn status(&self, job_id: &str) -> Option<ImportJob> {
        self.registry.get(job_id)
    }
}
