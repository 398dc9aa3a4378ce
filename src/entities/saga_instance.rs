use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStatus {
    /// Row inserted but not yet claimed by a driver; `start` moves it to
    /// `Running` itself, so this only lingers if the process crashes
    /// between insert and the first `drive` call.
    Pending,
    Running,
    Completed,
    Compensating,
    Compensated,
    Failed,
}

impl SagaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Pending => "pending",
            SagaStatus::Running => "running",
            SagaStatus::Completed => "completed",
            SagaStatus::Compensating => "compensating",
            SagaStatus::Compensated => "compensated",
            SagaStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SagaStatus::Pending),
            "running" => Some(SagaStatus::Running),
            "completed" => Some(SagaStatus::Completed),
            "compensating" => Some(SagaStatus::Compensating),
            "compensated" => Some(SagaStatus::Compensated),
            "failed" => Some(SagaStatus::Failed),
            _ => None,
        }
    }
}

/// One entry in `completed_steps`: which step finished, at what index, and
/// when, so operators can see saga progress without cross-referencing the
/// step definition by array position alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    pub index: usize,
    pub step_name: String,
    pub completed_at: DateTime<Utc>,
}

/// Durable record of an in-flight booking saga, so a process restart can
/// resume from `current_step` instead of re-running already-applied steps.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "saga_instances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub saga_type: String,
    pub booking_id: Uuid,
    pub status: String,
    pub current_step: i32,
    /// Per-step data bag (reservation token, payment intent id, etc.),
    /// documented per-step since a generic orchestrator cannot know each
    /// step's concrete payload type.
    pub context: Json,
    pub completed_steps: Json,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Set(Uuid::new_v4()),
            status: Set(SagaStatus::Pending.as_str().to_string()),
            current_step: Set(0),
            completed_steps: Set(serde_json::json!([])),
            created_at: Set(now),
            updated_at: Set(now),
            ..ActiveModelTrait::default()
        }
    }
}
