use axum::Router;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use ticketflow_core::{bus, config, db, health, inventory::RedisInventoryStore, metrics, outbox::pump, queue};
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app_config = config::load_config()?;
    config::init_tracing(&app_config.log_level, app_config.log_json);
    metrics::init();

    info!("starting ticketflow-core");

    let db_pool = db::establish_connection(&app_config.database_url).await?;
    db::run_migrations(&db_pool).await?;
    let db_pool = Arc::new(db_pool);

    let redis_client = redis::Client::open(app_config.redis_url.clone())?;
    let redis_conn = ConnectionManager::new(redis_client).await?;

    let _inventory = Arc::new(RedisInventoryStore::connect(&app_config.redis_url).await?);
    let message_bus = Arc::new(bus::RabbitMqBus::connect(&app_config.bus_url).await?);

    let queue_repo = queue::QueueRepository::new(
        redis_conn.clone(),
        app_config.queue.release_batch_size.max(1) * 10,
        app_config.queue.pass_ttl_secs,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let release_worker = queue::release_worker::ReleaseWorker::new(
        queue_repo,
        app_config.queue.jwt_secret.clone(),
        std::time::Duration::from_millis(app_config.queue.release_interval_ms),
        app_config.queue.release_batch_size,
    );
    let release_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        release_worker.run(release_shutdown).await;
    });

    let pump_config = pump::OutboxPumpConfig {
        batch_size: app_config.outbox.batch_size,
        poll_interval: std::time::Duration::from_millis(app_config.outbox.poll_interval_ms),
        retry_interval: std::time::Duration::from_millis(app_config.outbox.retry_interval_ms),
        cleanup_interval: std::time::Duration::from_secs(app_config.outbox.cleanup_interval_secs),
        retention_days: app_config.outbox.retention_days,
    };
    let outbox_db = db_pool.clone();
    let outbox_bus = message_bus.clone();
    let outbox_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        pump::run(outbox_db, outbox_bus, pump_config, outbox_shutdown).await;
    });

    let health_state = health::HealthState {
        db: db_pool.clone(),
        redis: redis_conn,
    };
    let app = Router::new().merge(health::router(health_state)).merge(metrics::router());

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "serving /healthz and /metrics");

    let server_shutdown = shutdown_rx.clone();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        let mut rx = server_shutdown;
        let _ = rx.changed().await;
    });

    tokio::select! {
        result = serve => {
            if let Err(err) = result {
                error!(error = %err, "http server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    }

    Ok(())
}
