//! Database connection, retry, and migration helpers.

use crate::errors::AppError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

pub type DbPool = DatabaseConnection;

/// Configuration for database retry logic.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

fn is_retryable_error(err: &sea_orm::DbErr) -> bool {
    match err {
        sea_orm::DbErr::Conn(_) => true,
        sea_orm::DbErr::ConnectionAcquire(_) => true,
        sea_orm::DbErr::Query(runtime_err) => {
            let msg = runtime_err.to_string().to_lowercase();
            msg.contains("connection")
                || msg.contains("timeout")
                || msg.contains("broken pipe")
                || msg.contains("reset by peer")
                || msg.contains("deadlock")
        }
        _ => false,
    }
}

/// Executes a database operation with retry logic and exponential backoff.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, sea_orm::DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sea_orm::DbErr>>,
{
    let mut attempts = 0;
    let mut delay = config.initial_delay;

    loop {
        attempts += 1;
        match f().await {
            Ok(result) => {
                if attempts > 1 {
                    info!(operation = operation_name, attempts, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) if attempts <= config.max_retries && is_retryable_error(&err) => {
                warn!(
                    operation = operation_name,
                    attempts,
                    error = %err,
                    "retrying after transient database error"
                );
                sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier),
                    config.max_delay,
                );
            }
            Err(err) => return Err(err),
        }
    }
}

/// Establishes a connection pool to the database.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, AppError> {
    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(true);

    let pool = Database::connect(opt).await?;
    info!("database connection pool established");
    Ok(pool)
}

/// Runs all pending migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    migrations::Migrator::up(pool, None).await?;
    info!("database migrations applied");
    Ok(())
}

/// Lightweight connectivity check, used by the health endpoint.
pub async fn check_connection(pool: &DbPool) -> Result<(), AppError> {
    use sea_orm::ConnectionTrait;
    pool.execute(sea_orm::Statement::from_string(
        pool.get_database_backend(),
        "SELECT 1".to_owned(),
    ))
    .await?;
    Ok(())
}
