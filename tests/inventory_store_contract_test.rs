//! Exercises the `InventoryStore` contract (reserve/release/confirm,
//! per-user quota, stock exhaustion, double-confirm rejection) against the
//! in-memory fake, which enforces the same rules as the Redis-backed Lua
//! scripts. This runs without any external services.

mod common;

use common::FakeInventoryStore;
use rust_decimal::Decimal;
use ticketflow_core::errors::ServiceError;
use ticketflow_core::inventory::{InventoryStore, ReserveRequest};
use uuid::Uuid;

fn base_request(zone_id: Uuid, user_id: Uuid) -> ReserveRequest {
    ReserveRequest {
        booking_id: Uuid::new_v4(),
        user_id,
        zone_id,
        event_id: Uuid::new_v4(),
        show_id: Uuid::new_v4(),
        quantity: 2,
        unit_price: Decimal::new(2500, 2),
        max_per_user: 10,
        ttl_seconds: 600,
    }
}

#[tokio::test]
async fn reserve_then_confirm_round_trip() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    store.init_zone(zone_id, 10).await.unwrap();

    let req = base_request(zone_id, Uuid::new_v4());
    let booking_id = req.booking_id;
    let outcome = store.reserve(req).await.unwrap();
    assert_eq!(outcome.new_available, 8);

    let confirmed = store.confirm(booking_id, Uuid::new_v4(), "pay_1").await.unwrap();
    assert!(confirmed.confirmed_at.timestamp() > 0);

    let record = store.get_reservation(booking_id).await.unwrap().unwrap();
    assert_eq!(record.status, "confirmed");
}

#[tokio::test]
async fn reserve_rejects_when_stock_exhausted() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    store.init_zone(zone_id, 1).await.unwrap();

    let mut req = base_request(zone_id, Uuid::new_v4());
    req.quantity = 2;
    let err = store.reserve(req).await.unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn reserve_rejects_when_user_quota_exceeded() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    store.init_zone(zone_id, 100).await.unwrap();
    let user_id = Uuid::new_v4();

    let mut first = base_request(zone_id, user_id);
    first.quantity = 9;
    first.max_per_user = 10;
    store.reserve(first).await.unwrap();

    let mut second = base_request(zone_id, user_id);
    second.quantity = 5;
    second.max_per_user = 10;
    let err = store.reserve(second).await.unwrap_err();
    assert!(matches!(err, ServiceError::QuotaExceeded(_)));
}

#[tokio::test]
async fn release_returns_seats_to_the_zone() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    store.init_zone(zone_id, 10).await.unwrap();

    let user_id = Uuid::new_v4();
    let req = base_request(zone_id, user_id);
    let booking_id = req.booking_id;
    store.reserve(req).await.unwrap();

    let outcome = store.release(booking_id, user_id).await.unwrap();
    assert_eq!(outcome.new_available, 10);

    let record = store.get_reservation(booking_id).await.unwrap().unwrap();
    assert_eq!(record.status, "cancelled");
}

#[tokio::test]
async fn confirming_twice_is_rejected_as_conflict() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    store.init_zone(zone_id, 10).await.unwrap();

    let user_id = Uuid::new_v4();
    let req = base_request(zone_id, user_id);
    let booking_id = req.booking_id;
    store.reserve(req).await.unwrap();

    store.confirm(booking_id, user_id, "pay_1").await.unwrap();
    let err = store.confirm(booking_id, user_id, "pay_2").await.unwrap_err();
    assert!(matches!(err, ServiceError::Conflict { .. }));
}

#[tokio::test]
async fn releasing_an_unknown_reservation_is_not_found() {
    let store = FakeInventoryStore::new();
    let err = store.release(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}
