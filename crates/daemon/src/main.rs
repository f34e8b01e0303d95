//! Playlist Import Service - Main Entry Point
//! JSON-RPC ingestion + Redis-backed queue + import worker

mod logging;
mod settings;

use anyhow::{Context, Result};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

// Import workspace crates
use playlist_import_api_rpc::RpcServer;
use playlist_import_core::application::{
    shutdown_channel, AuthGate, ImportService, JobRegistry, RetentionPolicy, RetentionSweeper,
    ShutdownCoordinator, ShutdownToken, Worker,
};
use playlist_import_core::port::id_provider::UuidProvider;
use playlist_import_core::port::time_provider::SystemTimeProvider;
use playlist_import_core::port::{JobQueue, QueueError};
use playlist_import_infra_redis::RedisJobQueue;
use playlist_import_infra_system::SubprocessImporter;
use settings::Settings;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // 1. Initialize logging
    let _log_guard = match logging::init(&settings.log_format, settings.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(settings).await {
        Ok(()) => {
            info!("Shutdown complete.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = ?e, "Playlist import service failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    info!("Playlist import service v{} starting...", VERSION);

    // 2. Termination signals (installed first so they also cut broker retries short)
    let mut signals = signals::Signals::install().context("Failed to install signal handlers")?;
    let (stop_tx, stop_token) = shutdown_channel();
    tokio::spawn(async move {
        let name = signals.recv().await;
        info!(signal = name, "Termination signal received");
        stop_tx.shutdown();
        // Keep the sender alive so tokens never observe a dropped channel
        std::future::pending::<()>().await;
    });

    // 3. Queue broker (retries until reachable or a signal arrives)
    let redis = settings.redis();
    info!(
        addr = %redis.display_addr(),
        prefix = %settings.queue_prefix,
        "Connecting to queue broker..."
    );
    let queue: Arc<dyn JobQueue> =
        match RedisJobQueue::connect(&redis, &settings.queue_prefix, stop_token.clone()).await {
            Ok(queue) => Arc::new(queue),
            Err(QueueError::Closed) => {
                info!("Shutdown requested before the queue was connected");
                return Ok(());
            }
            Err(e) => return Err(e).context("Queue broker connection failed"),
        };

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);
    let registry = Arc::new(JobRegistry::new(
        id_provider,
        time_provider,
        RetentionPolicy::default(),
    ));
    let import_service = Arc::new(ImportService::new(registry.clone(), queue.clone()));

    let auth = settings.auth();
    if !auth.disabled && auth.expected_token.is_none() {
        warn!("No API token configured; every submission will be rejected as misconfigured");
    }
    let auth_gate = Arc::new(AuthGate::new(auth));

    let importer = Arc::new(SubprocessImporter::with_default_env(settings.importer()));

    // 5. Start retention sweeper
    let sweeper = RetentionSweeper::new(registry.clone());
    let sweeper_handle = tokio::spawn(sweeper.run(stop_token.clone()));

    // 6. Start Worker (job processing loop)
    let worker_config = settings.worker();
    info!(concurrency = worker_config.concurrency, "Starting worker...");
    let worker = Worker::new(queue.clone(), registry, importer, worker_config);
    let (worker_tx, worker_token) = shutdown_channel();
    let worker_handle = tokio::spawn(async move { worker.run(worker_token).await });
    let coordinator = ShutdownCoordinator::new(worker_tx, worker_handle, queue);

    // 7. Start JSON-RPC server
    let rpc_server = RpcServer::new(settings.rpc(), import_service, auth_gate);
    let (rpc_handle, rpc_addr) = match rpc_server.start().await {
        Ok(started) => started,
        Err(e) => {
            // Worker is already consuming; drain it before bailing out
            if let Err(shutdown_err) = coordinator.shutdown().await {
                error!(error = %shutdown_err, "Shutdown after failed startup also failed");
            }
            return Err(anyhow::anyhow!("RPC server start failed: {}", e));
        }
    };

    info!(rpc_addr = %rpc_addr, "System ready. Waiting for imports...");

    // 8. Wait for shutdown signal
    wait_for_stop(stop_token).await;

    // 9. Graceful shutdown: drain worker, close queue, then stop the API
    let result = coordinator.shutdown().await;

    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server was already stopped");
    }
    rpc_handle.stopped().await;
    let _ = sweeper_handle.await;

    result.context("Shutdown sequence failed")
}

async fn wait_for_stop(mut token: ShutdownToken) {
    token.cancelled().await;
    info!("Shutdown signal received. Draining in-flight imports...");
}

mod signals {
    //! SIGINT and SIGTERM are handled identically

    #[cfg(unix)]
    use tokio::signal::unix::{signal, Signal, SignalKind};

    #[cfg(unix)]
    pub struct Signals {
        interrupt: Signal,
        terminate: Signal,
    }

    #[cfg(unix)]
    impl Signals {
        pub fn install() -> std::io::Result<Self> {
            Ok(Self {
                interrupt: signal(SignalKind::interrupt())?,
                terminate: signal(SignalKind::terminate())?,
            })
        }

        pub async fn recv(&mut self) -> &'static str {
            tokio::select! {
                _ = self.interrupt.recv() => "SIGINT",
                _ = self.terminate.recv() => "SIGTERM",
            }
        }
    }

    #[cfg(not(unix))]
    pub struct Signals;

    #[cfg(not(unix))]
    impl Signals {
        pub fn install() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) -> &'static str {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
            "CTRL_C"
        }
    }
}
