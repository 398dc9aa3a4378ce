//! `ticketflow-admin`: operator CLI for outbox/DLQ triage and manual queue
//! release, built against the same config and storage layer as the main
//! process.

use clap::{Parser, Subcommand};
use redis::aio::ConnectionManager;
use sea_orm::{DbBackend, Statement, ConnectionTrait};
use std::sync::Arc;
use ticketflow_core::{config, db, queue};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "ticketflow-admin", about = "Operator tooling for ticketflow-core")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Resets failed rows back to pending so the pump retries them immediately.
    RequeueFailed,
}

#[derive(Subcommand)]
enum DlqAction {
    /// Lists dead-lettered rows, most recent first.
    List {
        #[arg(long, default_value_t = 50)]
        limit: u64,
    },
    /// Re-enqueues a dead-lettered row as a fresh pending outbox row.
    Replay {
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Runs one release-worker tick immediately instead of waiting for the next timer.
    ReleaseNow,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let app_config = config::load_config()?;
    config::init_tracing(&app_config.log_level, app_config.log_json);

    let db_pool = Arc::new(db::establish_connection(&app_config.database_url).await?);

    match cli.command {
        Command::Outbox { action: OutboxAction::RequeueFailed } => {
            let sql = "UPDATE outbox_events SET status = 'pending', available_at = NOW(), updated_at = NOW() WHERE status = 'failed'";
            let result = db_pool
                .execute(Statement::from_string(DbBackend::Postgres, sql.to_string()))
                .await?;
            println!("requeued {} failed outbox rows", result.rows_affected());
        }
        Command::Dlq { action: DlqAction::List { limit } } => {
            use sea_orm::{EntityTrait, QueryOrder, QuerySelect};
            use ticketflow_core::entities::dead_letter;

            let rows = dead_letter::Entity::find()
                .order_by_desc(dead_letter::Column::MovedToDlqAt)
                .limit(limit)
                .all(db_pool.as_ref())
                .await?;
            for row in rows {
                println!(
                    "{}  topic={}  event={}  attempts={}  moved_at={}",
                    row.id, row.original_topic, row.event_type, row.attempts, row.moved_to_dlq_at
                );
            }
        }
        Command::Dlq { action: DlqAction::Replay { id } } => {
            use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set, EntityTrait};
            use ticketflow_core::entities::{dead_letter, outbox_event};

            let row = dead_letter::Entity::find_by_id(id)
                .one(db_pool.as_ref())
                .await?
                .ok_or("dead letter row not found")?;

            let replayed = outbox_event::ActiveModel {
                aggregate_type: Set("dlq-replay".to_string()),
                aggregate_id: Set(id),
                event_type: Set(row.event_type.clone()),
                partition_key: Set(id.to_string()),
                destination_topic: Set(row.original_topic.clone()),
                payload: Set(row.payload.clone()),
                ..ActiveModelBehavior::new()
            };
            replayed.insert(db_pool.as_ref()).await?;

            let mut active: dead_letter::ActiveModel = row.into();
            active.replayed_at = Set(Some(chrono::Utc::now()));
            active.update(db_pool.as_ref()).await?;

            println!("replayed dead letter {id} as a new pending outbox row");
        }
        Command::Queue { action: QueueAction::ReleaseNow } => {
            let redis_client = redis::Client::open(app_config.redis_url.clone())?;
            let redis_conn = ConnectionManager::new(redis_client).await?;
            let queue_repo = queue::QueueRepository::new(
                redis_conn,
                app_config.queue.release_batch_size.max(1) * 10,
                app_config.queue.pass_ttl_secs,
            );
            let worker = queue::release_worker::ReleaseWorker::new(
                queue_repo,
                app_config.queue.jwt_secret.clone(),
                std::time::Duration::from_millis(app_config.queue.release_interval_ms),
                app_config.queue.release_batch_size,
            );
            worker.tick().await?;
            println!("ran one release-worker tick across all active events");
        }
    }

    Ok(())
}
