//! The three ticker loops that drain `outbox_events`: a fast pending pump,
//! a slower failed-row retry sweep, and an hourly cleanup of old rows.

use crate::bus::MessageBus;
use crate::errors::ServiceError;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, QueryResult, Statement};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct OutboxPumpConfig {
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub retry_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention_days: i64,
}

struct ClaimedRow {
    id: Uuid,
    destination_topic: String,
    payload: Value,
    event_type: String,
    attempts: i32,
    max_attempts: i32,
}

/// Runs all three ticker loops until shutdown is signalled. Each loop is
/// independent so a slow cleanup pass never backs up message delivery.
pub async fn run(
    db: Arc<DatabaseConnection>,
    bus: Arc<dyn MessageBus>,
    config: OutboxPumpConfig,
    shutdown: watch::Receiver<bool>,
) {
    let pending = tokio::spawn(pending_pump_loop(
        db.clone(),
        bus,
        config.batch_size,
        config.poll_interval,
        shutdown.clone(),
    ));
    let retry = tokio::spawn(failed_retry_loop(
        db.clone(),
        config.retry_interval,
        shutdown.clone(),
    ));
    let cleanup = tokio::spawn(cleanup_loop(
        db,
        config.cleanup_interval,
        config.retention_days,
        shutdown,
    ));

    let _ = tokio::join!(pending, retry, cleanup);
}

async fn pending_pump_loop(
    db: Arc<DatabaseConnection>,
    bus: Arc<dyn MessageBus>,
    batch_size: u32,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = drain_pending_once(&db, bus.as_ref(), batch_size as i64).await {
                    warn!(error = %err, "outbox pending pump failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("outbox pending pump shutting down");
                    return;
                }
            }
        }
    }
}

/// Claims a batch of pending (or due-for-retry) rows with `FOR UPDATE SKIP
/// LOCKED` so multiple pollers never double-claim the same row, publishes
/// each, and marks it published or schedules a backoff retry.
async fn drain_pending_once(
    db: &DatabaseConnection,
    bus: &dyn MessageBus,
    batch_size: i64,
) -> Result<(), ServiceError> {
    let claim_sql = r#"
        WITH cte AS (
            SELECT id FROM outbox_events
            WHERE status IN ('pending', 'failed') AND available_at <= NOW() AND attempts < max_attempts
            ORDER BY created_at ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
        )
        UPDATE outbox_events o
        SET status = 'processing', updated_at = NOW(), attempts = o.attempts + 1
        FROM cte
        WHERE o.id = cte.id
        RETURNING o.id, o.destination_topic, o.payload, o.event_type, o.attempts, o.max_attempts
    "#;
    let stmt = Statement::from_sql_and_values(DbBackend::Postgres, claim_sql, vec![batch_size.into()]);
    let rows: Vec<QueryResult> = db.query_all(stmt).await?;

    for row in rows {
        let claimed = ClaimedRow {
            id: row.try_get("", "id").map_err(ServiceError::internal)?,
            destination_topic: row.try_get("", "destination_topic").map_err(ServiceError::internal)?,
            payload: row.try_get("", "payload").map_err(ServiceError::internal)?,
            event_type: row.try_get("", "event_type").map_err(ServiceError::internal)?,
            attempts: row.try_get("", "attempts").map_err(ServiceError::internal)?,
            max_attempts: row.try_get("", "max_attempts").map_err(ServiceError::internal)?,
        };
        dispatch_one(db, bus, claimed).await?;
    }
    Ok(())
}

async fn dispatch_one(db: &DatabaseConnection, bus: &dyn MessageBus, row: ClaimedRow) -> Result<(), ServiceError> {
    let bytes = serde_json::to_vec(&row.payload)?;
    match bus.publish(&row.destination_topic, &bytes).await {
        Ok(()) => {
            mark_published(db, row.id).await?;
            info!(outbox_id = %row.id, topic = %row.destination_topic, "outbox row published");
        }
        Err(err) => {
            warn!(outbox_id = %row.id, error = %err, attempts = row.attempts, "outbox publish failed");
            if row.attempts >= row.max_attempts {
                dead_letter(db, &row, &err.to_string()).await?;
            } else {
                schedule_retry(db, row.id, row.attempts, &err.to_string()).await?;
            }
        }
    }
    Ok(())
}

async fn mark_published(db: &DatabaseConnection, id: Uuid) -> Result<(), ServiceError> {
    let sql = r#"UPDATE outbox_events SET status = 'published', published_at = NOW(), updated_at = NOW(), last_error = NULL WHERE id = $1"#;
    db.execute(Statement::from_sql_and_values(DbBackend::Postgres, sql, vec![id.into()]))
        .await?;
    Ok(())
}

/// `100ms * attempts` backoff before a failed row becomes eligible again,
/// matching the saga step backoff so operators only need to reason about
/// one retry curve.
async fn schedule_retry(db: &DatabaseConnection, id: Uuid, attempts: i32, error: &str) -> Result<(), ServiceError> {
    let backoff_ms = 100i64 * attempts as i64;
    let sql = r#"
        UPDATE outbox_events
        SET status = 'failed', available_at = NOW() + ($2::bigint * interval '1 millisecond'),
            updated_at = NOW(), last_error = $3
        WHERE id = $1
    "#;
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        vec![id.into(), backoff_ms.into(), error.into()],
    ))
    .await?;
    Ok(())
}

async fn dead_letter(db: &DatabaseConnection, row: &ClaimedRow, error: &str) -> Result<(), ServiceError> {
    use crate::entities::dead_letter::ActiveModel as DeadLetterModel;
    use crate::entities::outbox_event::OutboxStatus;
    use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set};

    let model = DeadLetterModel {
        original_topic: Set(row.destination_topic.clone()),
        event_type: Set(row.event_type.clone()),
        payload: Set(row.payload.clone()),
        attempts: Set(row.attempts),
        last_error: Set(Some(error.to_string())),
        ..ActiveModelBehavior::new()
    };
    model.insert(db).await?;

    // `available_at` moves a century out so the row can never satisfy the
    // pending pump's `available_at <= NOW()` claim filter again, even if its
    // status were ever reset by hand.
    let sql = r#"
        UPDATE outbox_events
        SET status = $2, updated_at = NOW(), available_at = NOW() + interval '100 years', last_error = $3
        WHERE id = $1
    "#;
    db.execute(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        vec![
            row.id.into(),
            OutboxStatus::DeadLettered.as_str().into(),
            format!("dead-lettered: {error}").into(),
        ],
    ))
    .await?;

    error!(outbox_id = %row.id, topic = %row.destination_topic, "outbox row moved to dead letter table");
    Ok(())
}

async fn failed_retry_loop(db: Arc<DatabaseConnection>, retry_interval: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(retry_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = nudge_stuck_rows(&db).await {
                    warn!(error = %err, "outbox failed-retry sweep failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("outbox failed-retry sweep shutting down");
                    return;
                }
            }
        }
    }
}

/// Rows stuck in `processing` past a reasonable window mean the process
/// that claimed them died mid-flight; fold them back into `pending` so the
/// pump picks them up again. This is the at-least-once guarantee's other
/// half: the pump's `SKIP LOCKED` claim alone cannot recover a crashed
/// claimant.
async fn nudge_stuck_rows(db: &DatabaseConnection) -> Result<(), ServiceError> {
    let sql = r#"
        UPDATE outbox_events
        SET status = 'pending', updated_at = NOW()
        WHERE status = 'processing' AND updated_at < NOW() - interval '5 minutes'
    "#;
    let result = db.execute(Statement::from_string(DbBackend::Postgres, sql.to_string())).await?;
    if result.rows_affected() > 0 {
        warn!(count = result.rows_affected(), "recovered stuck outbox rows");
    }
    Ok(())
}

async fn cleanup_loop(
    db: Arc<DatabaseConnection>,
    cleanup_interval: Duration,
    retention_days: i64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(cleanup_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(err) = cleanup_once(&db, retention_days).await {
                    warn!(error = %err, "outbox cleanup failed");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("outbox cleanup shutting down");
                    return;
                }
            }
        }
    }
}

async fn cleanup_once(db: &DatabaseConnection, retention_days: i64) -> Result<(), ServiceError> {
    let sql = r#"
        DELETE FROM outbox_events
        WHERE status = 'published' AND published_at < NOW() - ($1::bigint * interval '1 day')
    "#;
    let result = db
        .execute(Statement::from_sql_and_values(DbBackend::Postgres, sql, vec![retention_days.into()]))
        .await?;
    if result.rows_affected() > 0 {
        info!(count = result.rows_affected(), "cleaned up published outbox rows");
    }
    Ok(())
}
