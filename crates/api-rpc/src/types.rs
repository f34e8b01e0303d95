//! RPC Request/Response Types

use playlist_import_core::domain::{ImportJob, JobStatus};
use serde::{Deserialize, Serialize};

/// import.submit.v1 - Submit a playlist for import
#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub playlist_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

impl From<&ImportJob> for SubmitResponse {
    fn from(job: &ImportJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
        }
    }
}

/// import.status.v1 - Poll a job
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub job_id: String,
}

/// The job record as the registry holds it (camelCase)
pub type StatusResponse = ImportJob;
