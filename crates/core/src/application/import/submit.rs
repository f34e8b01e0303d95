// Submit Use Case

use crate::application::registry::JobRegistry;
use crate::domain::{ImportJob, ImportPayload};
use crate::error::{AppError, Result};
use crate::port::{JobQueue, QueueMessage};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Longest playlist URL accepted
pub const MAX_PLAYLIST_URL_LEN: usize = 2048;

/// Submit request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRequest {
    pub playlist_url: String,
}

impl ImportRequest {
    pub fn new(playlist_url: impl Into<String>) -> Self {
        Self {
            playlist_url: playlist_url.into(),
        }
    }
}

/// Execute submit use case
///
/// # Arguments
///
/// * `registry` - Job registry (creates the record)
/// * `queue` - Work queue (receives the unit of work)
/// * `req` - Submit request
///
/// A rejected request never creates a job. A job whose enqueue fails is moved
/// to `error` so it does not sit in `queued` forever.
pub async fn execute(
    registry: &JobRegistry,
    queue: &dyn JobQueue,
    req: ImportRequest,
) -> Result<ImportJob> {
    validate_request(&req)?;
    let playlist_url = req.playlist_url.trim().to_string();

    let job = registry.create();
    let message = QueueMessage::new(job.id.clone(), ImportPayload::new(playlist_url.clone()));

    if let Err(e) = queue.enqueue(&message).await {
        error!(job_id = %job.id, error = %e, "Failed to enqueue import job");
        registry.set_error(&job.id, format!("Failed to enqueue job: {}", e));
        return Err(AppError::Queue(e));
    }

    info!(job_id = %job.id, playlist_url = %playlist_url, "Import job submitted");
    Ok(job)
}

/// Validate submit request
pub fn validate_request(req: &ImportRequest) -> Result<()> {
    let url = req.playlist_url.trim();

    if url.is_empty() {
        return Err(AppError::Validation(
            "playlist_url cannot be empty".to_string(),
        ));
    }

    if url.len() > MAX_PLAYLIST_URL_LEN {
        return Err(AppError::Validation(format!(
            "playlist_url too long: {} bytes (max {})",
            url.len(),
            MAX_PLAYLIST_URL_LEN
        )));
    }

    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        Some(_) => Err(AppError::Validation(
            "playlist_url is missing a host".to_string(),
        )),
        None => Err(AppError::Validation(format!(
            "playlist_url must use http or https: {}",
            url
        ))),
    }
}
