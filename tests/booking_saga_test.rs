//! End-to-end `reserve-seats -> process-payment -> confirm-booking` saga
//! against real Redis and an in-memory SQLite schema. Ignored by default
//! since it needs a reachable Redis instance.
//!
//! Run with: cargo test --test booking_saga_test -- --ignored

mod common;

use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use sea_orm::EntityTrait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticketflow_core::entities::saga_instance::{self, SagaStatus};
use ticketflow_core::inventory::{InventoryStore, RedisInventoryStore};
use ticketflow_core::queue::pass;
use ticketflow_core::reservation::idempotency::IdempotencyStore;
use ticketflow_core::reservation::ReservationService;
use ticketflow_core::saga::booking_saga::{self, MockPaymentGateway, PaymentGateway};
use ticketflow_core::saga::{SagaOrchestrator, SagaRetryPolicy};
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const QUEUE_PASS_SECRET: &str = "saga-test-secret-at-least-32-bytes-long!";

#[tokio::test]
#[ignore = "requires a local Redis instance"]
async fn booking_saga_completes_all_three_steps() {
    let db = Arc::new(common::test_db().await);
    let client = redis::Client::open(REDIS_URL).unwrap();
    let conn = ConnectionManager::new(client).await.unwrap();
    let inventory: Arc<dyn InventoryStore> = Arc::new(RedisInventoryStore::connect(REDIS_URL).await.unwrap());
    let idempotency = IdempotencyStore::new(conn, 3600);
    let reservation = Arc::new(ReservationService::new(
        db.clone(),
        inventory.clone(),
        idempotency,
        600,
        10,
        QUEUE_PASS_SECRET.to_string(),
    ));
    let payment: Arc<dyn PaymentGateway> = Arc::new(MockPaymentGateway::new());

    let zone_id = Uuid::new_v4();
    let zone_store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    zone_store.init_zone(zone_id, 20).await.unwrap();

    let definition = booking_saga::definition(reservation, payment);
    let orchestrator = SagaOrchestrator::new(
        db.clone(),
        SagaRetryPolicy {
            step_timeout: Duration::from_secs(5),
            max_retries: 2,
        },
    );

    let booking_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let queue_pass = pass::mint(user_id, event_id, chrono::Utc::now().timestamp(), 300, QUEUE_PASS_SECRET).unwrap();
    let context = json!({
        "idempotency_key": format!("saga-{}", Uuid::new_v4()),
        "user_id": user_id,
        "zone_id": zone_id,
        "event_id": event_id,
        "show_id": Uuid::new_v4(),
        "quantity": 2,
        "unit_price": "25.00",
        "queue_pass": queue_pass,
    });

    let saga_id = orchestrator.start(&definition, booking_id, context).await.unwrap();
    let instance = saga_instance::Entity::find_by_id(saga_id).one(db.as_ref()).await.unwrap().unwrap();

    assert_eq!(instance.status, SagaStatus::Completed.as_str());
    assert_eq!(instance.current_step, 3);
    assert!(instance.context.get("booking_id").is_some());
    assert!(instance.context.get("payment_id").is_some());
}

#[tokio::test]
#[ignore = "requires a local Redis instance"]
async fn booking_saga_compensates_when_payment_fails() {
    struct AlwaysDeclines;

    #[async_trait::async_trait]
    impl PaymentGateway for AlwaysDeclines {
        async fn charge(&self, _booking_id: Uuid, _user_id: Uuid, _amount: Decimal) -> Result<String, ticketflow_core::errors::ServiceError> {
            Err(ticketflow_core::errors::ServiceError::DependencyUnavailable("card declined".to_string()))
        }
        async fn refund(&self, _payment_id: &str) -> Result<(), ticketflow_core::errors::ServiceError> {
            Ok(())
        }
    }

    let db = Arc::new(common::test_db().await);
    let client = redis::Client::open(REDIS_URL).unwrap();
    let conn = ConnectionManager::new(client).await.unwrap();
    let inventory: Arc<dyn InventoryStore> = Arc::new(RedisInventoryStore::connect(REDIS_URL).await.unwrap());
    let idempotency = IdempotencyStore::new(conn, 3600);
    let reservation = Arc::new(ReservationService::new(
        db.clone(),
        inventory.clone(),
        idempotency,
        600,
        10,
        QUEUE_PASS_SECRET.to_string(),
    ));
    let payment: Arc<dyn PaymentGateway> = Arc::new(AlwaysDeclines);

    let zone_id = Uuid::new_v4();
    let zone_store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    zone_store.init_zone(zone_id, 20).await.unwrap();

    let definition = booking_saga::definition(reservation, payment);
    let orchestrator = SagaOrchestrator::new(
        db.clone(),
        SagaRetryPolicy {
            step_timeout: Duration::from_secs(2),
            max_retries: 0,
        },
    );

    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let queue_pass = pass::mint(user_id, event_id, chrono::Utc::now().timestamp(), 300, QUEUE_PASS_SECRET).unwrap();
    let context = json!({
        "idempotency_key": format!("saga-{}", Uuid::new_v4()),
        "user_id": user_id,
        "zone_id": zone_id,
        "event_id": event_id,
        "show_id": Uuid::new_v4(),
        "quantity": 2,
        "unit_price": "25.00",
        "queue_pass": queue_pass,
    });

    let saga_id = orchestrator.start(&definition, Uuid::new_v4(), context).await.unwrap();
    let instance = saga_instance::Entity::find_by_id(saga_id).one(db.as_ref()).await.unwrap().unwrap();
    assert_eq!(instance.status, SagaStatus::Compensated.as_str());

    // The reserved seats should have been released by the compensation of
    // the first step, so the zone is back to full availability.
    let booking_id_str = instance.context["booking_id"].as_str().unwrap().to_string();
    let booking_id = Uuid::parse_str(&booking_id_str).unwrap();
    let record = inventory.get_reservation(booking_id).await.unwrap().unwrap();
    assert_eq!(record.status, "cancelled");
}
