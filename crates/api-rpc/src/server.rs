//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP (TCP). The `Authorization` header reaches the
//! method callbacks through the request extensions.

use crate::handler::RpcHandler;
use crate::middleware::{AuthHeaderLayer, AuthorizationHeader};
use crate::types::{StatusRequest, SubmitRequest};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use playlist_import_core::application::{AuthGate, ImportService};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9630;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<ImportService>, auth: Arc<AuthGate>) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service, auth)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// # Returns
    /// The server handle and the bound address (useful with port 0)
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let http_middleware = tower::ServiceBuilder::new().layer(AuthHeaderLayer);
        let server = Server::builder()
            .set_http_middleware(http_middleware)
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        // Register methods
        let handler = self.handler.clone();
        module
            .register_async_method("import.submit.v1", move |params, _, extensions| {
                let handler = handler.clone();
                async move {
                    let req: SubmitRequest = params.parse()?;
                    let authorization = extensions
                        .get::<AuthorizationHeader>()
                        .and_then(|header| header.as_deref());
                    handler.submit(req, authorization).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("import.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatusRequest = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}
