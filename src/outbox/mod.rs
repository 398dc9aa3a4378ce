//! Transactional outbox: every state change that must reach the bus is
//! written to `outbox_events` in the same transaction as the domain write,
//! then drained by three independent ticker loops.

pub mod pump;

use crate::errors::ServiceError;
use sea_orm::{ActiveValue::Set, ConnectionTrait};
use serde_json::Value;
use uuid::Uuid;

/// Appends a pending outbox row. Caller is expected to run this inside the
/// same transaction as the write it is reporting, so the two either both
/// commit or both roll back.
pub async fn enqueue(
    db: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Uuid,
    event_type: &str,
    partition_key: &str,
    destination_topic: &str,
    payload: Value,
) -> Result<Uuid, ServiceError> {
    use crate::entities::outbox_event::ActiveModel;
    use sea_orm::{ActiveModelBehavior, ActiveModelTrait};

    let model = ActiveModel {
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event_type.to_string()),
        partition_key: Set(partition_key.to_string()),
        destination_topic: Set(destination_topic.to_string()),
        payload: Set(payload),
        max_attempts: Set(8),
        ..ActiveModelBehavior::new()
    };
    let inserted = model.insert(db).await?;
    Ok(inserted.id)
}
