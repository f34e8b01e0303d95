// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod progress;

// Re-exports
pub use error::DomainError;
pub use job::{ImportJob, ImportPayload, JobId, JobStatus};
pub use progress::{ImportResult, ProgressUpdate};
