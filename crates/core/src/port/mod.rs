// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_queue;
pub mod pipeline;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_queue::{Delivery, JobQueue, QueueError, QueueEvent, QueueMessage};
pub use pipeline::{PipelineError, PlaylistImporter, ProgressReporter, ProgressSink};
pub use time_provider::TimeProvider;
