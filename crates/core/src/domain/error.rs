// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Inconsistent progress: {0}")]
    InconsistentProgress(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
