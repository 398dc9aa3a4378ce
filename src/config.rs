//! Application configuration: layered `config`-crate sources, validated
//! with `validator`, plus `tracing` initialization.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_ENV: &str = "development";
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_DIR: &str = "config";

/// Outbox poller tuning (spec §4.3 / §6).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_outbox_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_outbox_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_outbox_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_outbox_retention_days")]
    pub retention_days: i64,
}

fn default_outbox_batch_size() -> u32 {
    100
}
fn default_outbox_poll_interval_ms() -> u64 {
    100
}
fn default_outbox_retry_interval_ms() -> u64 {
    5_000
}
fn default_outbox_cleanup_interval_secs() -> u64 {
    3_600
}
fn default_outbox_max_attempts() -> i32 {
    8
}
fn default_outbox_retention_days() -> i64 {
    7
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_outbox_batch_size(),
            poll_interval_ms: default_outbox_poll_interval_ms(),
            retry_interval_ms: default_outbox_retry_interval_ms(),
            cleanup_interval_secs: default_outbox_cleanup_interval_secs(),
            max_attempts: default_outbox_max_attempts(),
            retention_days: default_outbox_retention_days(),
        }
    }
}

/// Virtual queue / release worker tuning (spec §4.4 / §6).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct QueueConfig {
    /// HMAC signing secret for queue passes. No default: must be supplied.
    #[validate(length(min = 32))]
    pub jwt_secret: String,
    #[serde(default = "default_pass_ttl_secs")]
    pub pass_ttl_secs: i64,
    #[serde(default = "default_release_batch_size")]
    pub release_batch_size: u32,
    #[serde(default = "default_release_interval_ms")]
    pub release_interval_ms: u64,
}

fn default_pass_ttl_secs() -> i64 {
    300
}
fn default_release_batch_size() -> u32 {
    50
}
fn default_release_interval_ms() -> u64 {
    1_000
}

/// Reservation / saga tuning (spec §6).
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ReservationConfig {
    #[serde(default = "default_reservation_ttl_secs")]
    pub reservation_ttl_secs: i64,
    #[serde(default = "default_max_per_user")]
    pub max_per_user: u32,
    #[serde(default = "default_idempotency_ttl_secs")]
    pub idempotency_ttl_secs: usize,
}

fn default_reservation_ttl_secs() -> i64 {
    600
}
fn default_max_per_user() -> u32 {
    10
}
fn default_idempotency_ttl_secs() -> usize {
    600
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct SagaConfig {
    #[serde(default = "default_saga_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_saga_max_retries")]
    pub max_retries: u32,
}

fn default_saga_step_timeout_secs() -> u64 {
    30
}
fn default_saga_max_retries() -> u32 {
    2
}

/// Top-level application configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    pub database_url: String,
    pub redis_url: String,
    pub bus_url: String,

    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,

    #[validate]
    pub queue: QueueConfig,
    #[validate]
    #[serde(default)]
    pub outbox: OutboxConfig,
    #[validate]
    #[serde(default)]
    pub reservation: ReservationConfig,
    #[validate]
    #[serde(default)]
    pub saga: SagaConfig,
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_secs: default_reservation_ttl_secs(),
            max_per_user: default_max_per_user(),
            idempotency_ttl_secs: default_idempotency_ttl_secs(),
        }
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_saga_step_timeout_secs(),
            max_retries: default_saga_max_retries(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppConfigError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("{0}")]
    Missing(String),
}

/// Initializes the global tracing subscriber.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("ticketflow_core={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbox_defaults_match_documented_tuning() {
        let defaults = OutboxConfig::default();
        assert_eq!(defaults.poll_interval_ms, 100);
        assert_eq!(defaults.batch_size, 100);
        assert_eq!(defaults.max_attempts, 8);
    }

    #[test]
    fn reservation_defaults_match_documented_tuning() {
        let defaults = ReservationConfig::default();
        assert_eq!(defaults.max_per_user, 10);
        assert_eq!(defaults.reservation_ttl_secs, 600);
    }

    #[test]
    fn saga_defaults_match_documented_tuning() {
        let defaults = SagaConfig::default();
        assert_eq!(defaults.max_retries, 2);
        assert_eq!(defaults.step_timeout_secs, 30);
    }
}

/// Loads configuration from `config/default.{toml,yaml}`, an
/// environment-specific override, and `APP__`-prefixed environment
/// variables, in that order of increasing precedence.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!(environment = %run_env, "loading configuration");

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "config directory '{}' not found; relying on defaults and environment variables",
            CONFIG_DIR
        );
    }

    // queue.jwt_secret has no default: it must come from config or env.
    let builder = Config::builder()
        .set_default("database_url", "postgres://localhost/ticketflow")?
        .set_default("redis_url", "redis://localhost:6379")?
        .set_default("bus_url", "amqp://localhost:5672/%2f")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", 8080)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let config = builder.build()?;

    if config.get_string("queue.jwt_secret").is_err() {
        return Err(AppConfigError::Missing(
            "queue.jwt_secret must be set via config or APP__QUEUE__JWT_SECRET".to_string(),
        ));
    }

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}
