// Application Layer - Use Cases and Business Logic

pub mod auth;
pub mod import;
pub mod registry;
pub mod retention;
pub mod shutdown;
pub mod worker;

// Re-exports
pub use auth::{AuthConfig, AuthError, AuthGate};
pub use import::{ImportRequest, ImportService};
pub use registry::{JobRegistry, RetentionPolicy};
pub use retention::RetentionSweeper;
pub use shutdown::ShutdownCoordinator;
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerConfig};
