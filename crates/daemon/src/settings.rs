//! Daemon configuration
//!
//! Every field can be set through a `PLAYLIST_IMPORT_<FIELD>` environment
//! variable, e.g. `PLAYLIST_IMPORT_REDIS_HOST`.

use config::{Config, ConfigError, Environment};
use playlist_import_api_rpc::server::{DEFAULT_RPC_HOST, DEFAULT_RPC_PORT};
use playlist_import_api_rpc::RpcServerConfig;
use playlist_import_core::application::worker::constants::DEFAULT_CONCURRENCY;
use playlist_import_core::application::{AuthConfig, WorkerConfig};
use playlist_import_infra_redis::RedisSettings;
use playlist_import_infra_system::ImporterCommand;
use serde::Deserialize;
use std::collections::HashMap;

pub const ENV_PREFIX: &str = "PLAYLIST_IMPORT";
const DEFAULT_QUEUE_PREFIX: &str = "playlist-import";
const DEFAULT_IMPORTER_COMMAND: &str = "playlist-importer";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub redis_host: String,
    pub redis_port: u16,
    pub redis_username: Option<String>,
    pub redis_password: Option<String>,
    pub redis_db: i64,
    pub queue_prefix: String,

    pub auth_disabled: bool,
    pub api_token: Option<String>,

    pub worker_concurrency: usize,

    pub rpc_host: String,
    pub rpc_port: u16,

    pub importer_command: String,
    /// Space separated in the environment
    pub importer_args: Vec<String>,

    pub log_format: String,
    pub log_dir: Option<String>,
}

impl Settings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from `vars` instead of the process environment when given
    pub fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("redis_host", "127.0.0.1")?
            .set_default("redis_port", 6379_i64)?
            .set_default("redis_db", 0_i64)?
            .set_default("queue_prefix", DEFAULT_QUEUE_PREFIX)?
            .set_default("auth_disabled", false)?
            .set_default("worker_concurrency", DEFAULT_CONCURRENCY as i64)?
            .set_default("rpc_host", DEFAULT_RPC_HOST)?
            .set_default("rpc_port", i64::from(DEFAULT_RPC_PORT))?
            .set_default("importer_command", DEFAULT_IMPORTER_COMMAND)?
            .set_default("importer_args", Vec::<String>::new())?
            .set_default("log_format", "pretty")?
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(" ")
                    .with_list_parse_key("importer_args")
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }

    pub fn redis(&self) -> RedisSettings {
        RedisSettings {
            host: self.redis_host.clone(),
            port: self.redis_port,
            username: self.redis_username.clone(),
            password: self.redis_password.clone(),
            db: self.redis_db,
        }
    }

    pub fn auth(&self) -> AuthConfig {
        AuthConfig {
            disabled: self.auth_disabled,
            expected_token: self.api_token.clone().filter(|t| !t.is_empty()),
        }
    }

    pub fn worker(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency.max(1),
            ..WorkerConfig::default()
        }
    }

    pub fn rpc(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }

    pub fn importer(&self) -> ImporterCommand {
        ImporterCommand::new(self.importer_command.clone(), self.importer_args.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load(vars(&[])).unwrap();

        assert_eq!(settings.redis_host, "127.0.0.1");
        assert_eq!(settings.redis_port, 6379);
        assert!(settings.redis_password.is_none());
        assert_eq!(settings.queue_prefix, "playlist-import");
        assert!(!settings.auth_disabled);
        assert!(settings.api_token.is_none());
        assert_eq!(settings.worker_concurrency, 1);
        assert_eq!(settings.rpc_port, 9630);
        assert!(settings.importer_args.is_empty());
        assert_eq!(settings.log_format, "pretty");
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::load(vars(&[
            ("PLAYLIST_IMPORT_REDIS_HOST", "redis.internal"),
            ("PLAYLIST_IMPORT_REDIS_PORT", "6380"),
            ("PLAYLIST_IMPORT_REDIS_PASSWORD", "hunter2"),
            ("PLAYLIST_IMPORT_AUTH_DISABLED", "true"),
            ("PLAYLIST_IMPORT_WORKER_CONCURRENCY", "4"),
            ("PLAYLIST_IMPORT_IMPORTER_COMMAND", "/usr/local/bin/importer"),
            ("PLAYLIST_IMPORT_IMPORTER_ARGS", "--format mp3"),
        ]))
        .unwrap();

        let redis = settings.redis();
        assert_eq!(redis.host, "redis.internal");
        assert_eq!(redis.port, 6380);
        assert_eq!(redis.password.as_deref(), Some("hunter2"));
        assert!(settings.auth().disabled);
        assert_eq!(settings.worker().concurrency, 4);

        let importer = settings.importer();
        assert_eq!(importer.program, "/usr/local/bin/importer");
        assert_eq!(importer.args, vec!["--format", "mp3"]);
    }

    #[test]
    fn test_empty_token_counts_as_unset() {
        let settings =
            Settings::load(vars(&[("PLAYLIST_IMPORT_API_TOKEN", "")])).unwrap();
        assert!(settings.auth().expected_token.is_none());
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        let settings =
            Settings::load(vars(&[("PLAYLIST_IMPORT_WORKER_CONCURRENCY", "0")])).unwrap();
        assert_eq!(settings.worker().concurrency, 1);
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        assert!(Settings::load(vars(&[("PLAYLIST_IMPORT_RPC_PORT", "not-a-port")])).is_err());
    }
}
