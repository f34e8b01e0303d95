// Redis Connection Setup

use playlist_import_core::application::worker::constants::{
    next_backoff, RECONNECT_BASE_DELAY,
};
use playlist_import_core::application::ShutdownToken;
use playlist_import_core::port::QueueError;
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError};
use tracing::{info, warn};

/// Broker connection parameters
///
/// No password means no AUTH, not a failure.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            db: 0,
        }
    }
}

impl RedisSettings {
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                username: self.username.clone().filter(|u| !u.is_empty()),
                password: self.password.clone().filter(|p| !p.is_empty()),
                ..Default::default()
            },
        }
    }

    /// `host:port/db` for logs (never includes credentials)
    pub fn display_addr(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Open one managed connection (single attempt)
pub(crate) async fn connect_once(
    settings: &RedisSettings,
) -> Result<ConnectionManager, QueueError> {
    let client = redis::Client::open(settings.connection_info()).map_err(map_redis_error)?;
    ConnectionManager::new(client).await.map_err(map_redis_error)
}

/// Open one managed connection, retrying with capped backoff until it
/// succeeds or `shutdown` fires (`QueueError::Closed`)
pub async fn connect_with_retry(
    settings: &RedisSettings,
    mut shutdown: ShutdownToken,
) -> Result<ConnectionManager, QueueError> {
    let mut delay = RECONNECT_BASE_DELAY;
    let mut attempt: u64 = 0;

    loop {
        if shutdown.is_shutdown() {
            return Err(QueueError::Closed);
        }
        attempt += 1;

        match connect_once(settings).await {
            Ok(conn) => {
                info!(addr = %settings.display_addr(), attempt, "Connected to Redis");
                return Ok(conn);
            }
            Err(e) => {
                warn!(
                    addr = %settings.display_addr(),
                    attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Redis unavailable, retrying"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => {
                info!("Shutdown requested while connecting to Redis");
                return Err(QueueError::Closed);
            }
        }
        delay = next_backoff(delay);
    }
}

/// Connection-class failures become `Connection` (retried), the rest `Broker`
pub(crate) fn map_redis_error(err: RedisError) -> QueueError {
    if err.kind() == ErrorKind::IoError
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        QueueError::Connection(err.to_string())
    } else {
        QueueError::Broker(err.to_string())
    }
}
