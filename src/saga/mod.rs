//! Generic saga orchestrator: a durable sequence of steps with per-step
//! timeout and retry, reverse-order compensation on failure, and the
//! ability to resume an in-flight instance after a process restart.

pub mod booking_saga;

use crate::entities::saga_instance::{self, CompletedStep, SagaStatus};
use crate::errors::ServiceError;
use async_trait::async_trait;
use sea_orm::{ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set, DatabaseConnection, EntityTrait};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// One step of a saga. `execute` and `compensate` both receive the shared
/// context bag so a later step can read an earlier step's output (e.g. a
/// payment intent id) without a bespoke per-step return type.
#[async_trait]
pub trait SagaStep: Send + Sync {
    fn name(&self) -> &str;
    async fn execute(&self, context: &mut Value) -> Result<(), ServiceError>;
    async fn compensate(&self, context: &Value) -> Result<(), ServiceError>;
}

pub struct SagaDefinition {
    pub saga_type: String,
    pub steps: Vec<Arc<dyn SagaStep>>,
}

#[derive(Clone, Copy)]
pub struct SagaRetryPolicy {
    pub step_timeout: Duration,
    pub max_retries: u32,
}

pub struct SagaOrchestrator {
    db: Arc<DatabaseConnection>,
    retry_policy: SagaRetryPolicy,
}

impl SagaOrchestrator {
    pub fn new(db: Arc<DatabaseConnection>, retry_policy: SagaRetryPolicy) -> Self {
        Self { db, retry_policy }
    }

    pub async fn start(
        &self,
        definition: &SagaDefinition,
        booking_id: Uuid,
        initial_context: Value,
    ) -> Result<Uuid, ServiceError> {
        let model = saga_instance::ActiveModel {
            saga_type: Set(definition.saga_type.clone()),
            booking_id: Set(booking_id),
            context: Set(initial_context),
            ..ActiveModelBehavior::new()
        };
        let inserted = model.insert(self.db.as_ref()).await?;
        let saga_id = inserted.id;

        self.drive(definition, saga_id).await?;
        Ok(saga_id)
    }

    /// Re-drives a saga that was left `Running` or `Compensating` by a
    /// prior process, continuing from its persisted `current_step`.
    pub async fn resume(&self, definition: &SagaDefinition, saga_id: Uuid) -> Result<(), ServiceError> {
        self.drive(definition, saga_id).await
    }

    async fn drive(&self, definition: &SagaDefinition, saga_id: Uuid) -> Result<(), ServiceError> {
        let instance = saga_instance::Entity::find_by_id(saga_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("saga instance {saga_id} not found")))?;

        if instance.status == SagaStatus::Compensating.as_str() {
            return self.run_compensation(definition, saga_id, instance.current_step as usize).await;
        }

        if instance.status == SagaStatus::Pending.as_str() {
            self.mark_status(saga_id, SagaStatus::Running, None).await?;
        }

        let mut context = instance.context.clone();
        let start_step = instance.current_step as usize;

        for (index, step) in definition.steps.iter().enumerate().skip(start_step) {
            match self.run_step_with_retry(step.as_ref(), &mut context).await {
                Ok(()) => {
                    self.record_step_completed(saga_id, index, step.name(), &context).await?;
                }
                Err(err) => {
                    warn!(saga_id = %saga_id, step = step.name(), error = %err, "saga step failed, compensating");
                    self.mark_status(saga_id, SagaStatus::Compensating, Some(err.to_string())).await?;
                    return self.run_compensation(definition, saga_id, index).await;
                }
            }
        }

        self.mark_status(saga_id, SagaStatus::Completed, None).await?;
        info!(saga_id = %saga_id, saga_type = %definition.saga_type, "saga completed");
        Ok(())
    }

    async fn run_step_with_retry(&self, step: &dyn SagaStep, context: &mut Value) -> Result<(), ServiceError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::time::timeout(self.retry_policy.step_timeout, step.execute(context)).await;
            match result {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) if attempt <= self.retry_policy.max_retries => {
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    warn!(step = step.name(), attempt, error = %err, "retrying saga step");
                }
                Ok(Err(err)) => return Err(err),
                Err(_) if attempt <= self.retry_policy.max_retries => {
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                    warn!(step = step.name(), attempt, "saga step timed out, retrying");
                }
                Err(_) => {
                    return Err(ServiceError::DeadlineExceeded(format!(
                        "saga step {} timed out after {} attempts",
                        step.name(),
                        attempt
                    )))
                }
            }
        }
    }

    /// Compensates every step that completed before `failed_step_index`, in
    /// reverse order, since later steps depend on state earlier ones set up.
    /// The step at `failed_step_index` itself never succeeded, so it has
    /// nothing to undo and is excluded.
    async fn run_compensation(
        &self,
        definition: &SagaDefinition,
        saga_id: Uuid,
        failed_step_index: usize,
    ) -> Result<(), ServiceError> {
        let instance = saga_instance::Entity::find_by_id(saga_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("saga instance {saga_id} not found")))?;
        let context = instance.context.clone();

        for step in definition.steps[..failed_step_index].iter().rev() {
            if let Err(err) = step.compensate(&context).await {
                warn!(saga_id = %saga_id, step = step.name(), error = %err, "compensation step failed");
            }
        }

        self.mark_status(saga_id, SagaStatus::Compensated, None).await?;
        info!(saga_id = %saga_id, "saga compensated");
        Ok(())
    }

    async fn record_step_completed(
        &self,
        saga_id: Uuid,
        step_index: usize,
        step_name: &str,
        context: &Value,
    ) -> Result<(), ServiceError> {
        let instance = saga_instance::Entity::find_by_id(saga_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("saga instance {saga_id} not found")))?;

        let mut completed: Vec<CompletedStep> =
            serde_json::from_value(instance.completed_steps.clone()).unwrap_or_default();
        completed.push(CompletedStep {
            index: step_index,
            step_name: step_name.to_string(),
            completed_at: chrono::Utc::now(),
        });

        let mut active: saga_instance::ActiveModel = instance.into();
        active.current_step = Set((step_index + 1) as i32);
        active.context = Set(context.clone());
        active.completed_steps = Set(serde_json::to_value(completed).unwrap_or_default());
        active.updated_at = Set(chrono::Utc::now());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }

    async fn mark_status(&self, saga_id: Uuid, status: SagaStatus, error: Option<String>) -> Result<(), ServiceError> {
        let instance = saga_instance::Entity::find_by_id(saga_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("saga instance {saga_id} not found")))?;
        let mut active: saga_instance::ActiveModel = instance.into();
        active.status = Set(status.as_str().to_string());
        active.last_error = Set(error);
        active.updated_at = Set(chrono::Utc::now());
        active.update(self.db.as_ref()).await?;
        Ok(())
    }
}
