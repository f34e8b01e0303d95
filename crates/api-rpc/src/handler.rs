//! RPC Method Handlers

use crate::error::to_rpc_error;
use crate::types::{StatusRequest, StatusResponse, SubmitRequest, SubmitResponse};
use jsonrpsee::types::ErrorObjectOwned;
use playlist_import_core::application::{AuthGate, ImportRequest, ImportService};
use playlist_import_core::error::AppError;
use std::sync::Arc;
use tracing::warn;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<ImportService>,
    auth: Arc<AuthGate>,
}

impl RpcHandler {
    pub fn new(service: Arc<ImportService>, auth: Arc<AuthGate>) -> Self {
        Self { service, auth }
    }

    /// import.submit.v1
    ///
    /// The auth gate runs before anything else; a rejected call creates no job.
    pub async fn submit(
        &self,
        params: SubmitRequest,
        authorization: Option<&str>,
    ) -> Result<SubmitResponse, ErrorObjectOwned> {
        if let Err(e) = self.auth.authorize(authorization) {
            warn!(error = %e, status = e.status_code(), "Rejected import submission");
            return Err(to_rpc_error(AppError::Auth(e)));
        }

        let job = self
            .service
            .submit(ImportRequest::new(params.playlist_url))
            .await
            .map_err(to_rpc_error)?;

        Ok(SubmitResponse::from(&job))
    }

    /// import.status.v1
    pub async fn status(&self, params: StatusRequest) -> Result<StatusResponse, ErrorObjectOwned> {
        self.service.status(&params.job_id).ok_or_else(|| {
            to_rpc_error(AppError::NotFound(format!(
                "Job {} not found",
                params.job_id
            )))
        })
    }
}
