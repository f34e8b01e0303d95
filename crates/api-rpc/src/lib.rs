//! JSON-RPC API Layer
//!
//! JSON-RPC 2.0 ingestion boundary for the playlist import service:
//! `import.submit.v1` (bearer-token gated) and `import.status.v1`.

pub mod error;
pub mod handler;
pub mod middleware;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
