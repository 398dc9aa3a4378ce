//! End-to-end reservation lifecycle against real Redis (for the atomic
//! inventory scripts and idempotency store) and an in-memory SQLite schema.
//! Ignored by default since it needs a reachable Redis instance.
//!
//! Run with: cargo test --test reservation_service_test -- --ignored

mod common;

use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use std::sync::Arc;
use ticketflow_core::errors::ServiceError;
use ticketflow_core::inventory::{InventoryStore, RedisInventoryStore};
use ticketflow_core::queue::pass;
use ticketflow_core::reservation::idempotency::IdempotencyStore;
use ticketflow_core::reservation::{ReservationService, ReserveSeatsRequest};
use uuid::Uuid;

const REDIS_URL: &str = "redis://127.0.0.1:6379";
const QUEUE_PASS_SECRET: &str = "reservation-test-secret-at-least-32-bytes!";

async fn build_service() -> ReservationService {
    let db = Arc::new(common::test_db().await);
    let client = redis::Client::open(REDIS_URL).expect("open redis url");
    let conn = ConnectionManager::new(client).await.expect("connect redis");
    let inventory: Arc<dyn InventoryStore> = Arc::new(RedisInventoryStore::connect(REDIS_URL).await.unwrap());
    let idempotency = IdempotencyStore::new(conn, 3600);
    ReservationService::new(db, inventory, idempotency, 600, 10, QUEUE_PASS_SECRET.to_string())
}

fn queue_pass_for(user_id: Uuid, event_id: Uuid) -> String {
    pass::mint(user_id, event_id, chrono::Utc::now().timestamp(), 300, QUEUE_PASS_SECRET).unwrap()
}

#[tokio::test]
#[ignore = "requires a local Redis instance"]
async fn reserve_confirm_round_trip() {
    let service = build_service().await;
    let zone_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    // Give the underlying store a zone to reserve against.
    let store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    store.init_zone(zone_id, 10).await.unwrap();

    let req = ReserveSeatsRequest {
        idempotency_key: format!("test-{}", Uuid::new_v4()),
        user_id,
        zone_id,
        event_id,
        show_id: Uuid::new_v4(),
        quantity: 2,
        unit_price: Decimal::new(2500, 2),
        queue_pass: queue_pass_for(user_id, event_id),
    };

    let result = service.reserve_seats(req.clone()).await.unwrap();
    assert_eq!(result.status, "reserved");

    // Re-submitting the same idempotency key must replay the cached result
    // instead of reserving a second time.
    let replay = service.reserve_seats(req).await.unwrap();
    assert_eq!(replay.booking_id, result.booking_id);

    let confirmed = service.confirm_booking(result.booking_id, Uuid::new_v4(), "pay_1").await;
    assert!(confirmed.is_ok());
}

#[tokio::test]
#[ignore = "requires a local Redis instance"]
async fn cancel_releases_inventory_and_marks_booking_cancelled() {
    let service = build_service().await;
    let zone_id = Uuid::new_v4();
    let store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    store.init_zone(zone_id, 5).await.unwrap();

    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let req = ReserveSeatsRequest {
        idempotency_key: format!("test-{}", Uuid::new_v4()),
        user_id,
        zone_id,
        event_id,
        show_id: Uuid::new_v4(),
        quantity: 3,
        unit_price: Decimal::new(1000, 2),
        queue_pass: queue_pass_for(user_id, event_id),
    };
    let result = service.reserve_seats(req).await.unwrap();

    let cancelled = service.cancel_booking(result.booking_id, user_id).await.unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let err = service.confirm_booking(result.booking_id, user_id, "pay_1").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict { .. } | ServiceError::NotFound(_)));
}

#[tokio::test]
#[ignore = "requires a local Redis instance"]
async fn expire_sweep_releases_lapsed_holds() {
    let db = Arc::new(common::test_db().await);
    let client = redis::Client::open(REDIS_URL).unwrap();
    let conn = ConnectionManager::new(client).await.unwrap();
    let inventory: Arc<dyn InventoryStore> = Arc::new(RedisInventoryStore::connect(REDIS_URL).await.unwrap());
    let idempotency = IdempotencyStore::new(conn, 3600);
    // A 0-second TTL means the reservation is already eligible for sweep by
    // the time we ask for it.
    let service = ReservationService::new(db, inventory, idempotency, 0, 10, QUEUE_PASS_SECRET.to_string());

    let zone_id = Uuid::new_v4();
    let zone_store = RedisInventoryStore::connect(REDIS_URL).await.unwrap();
    zone_store.init_zone(zone_id, 5).await.unwrap();

    let user_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let req = ReserveSeatsRequest {
        idempotency_key: format!("test-{}", Uuid::new_v4()),
        user_id,
        zone_id,
        event_id,
        show_id: Uuid::new_v4(),
        quantity: 1,
        unit_price: Decimal::new(500, 2),
        queue_pass: queue_pass_for(user_id, event_id),
    };
    service.reserve_seats(req).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    let swept = service.expire_sweep(10).await.unwrap();
    assert!(swept >= 1);
}
