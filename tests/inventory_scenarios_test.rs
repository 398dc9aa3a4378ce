//! Concrete reserve/release/quota scenarios against the in-memory
//! `FakeInventoryStore`, parametrized over zone capacity and request
//! quantities with `rstest`.

mod common;

use common::FakeInventoryStore;
use rust_decimal::Decimal;
use rstest::rstest;
use ticketflow_core::inventory::{InventoryStore, ReserveRequest};
use uuid::Uuid;

fn reserve_request(booking_id: Uuid, user_id: Uuid, zone_id: Uuid, event_id: Uuid, quantity: i64, max_per_user: i64) -> ReserveRequest {
    ReserveRequest {
        booking_id,
        user_id,
        zone_id,
        event_id,
        show_id: Uuid::new_v4(),
        quantity,
        unit_price: Decimal::new(1999, 2),
        max_per_user,
        ttl_seconds: 600,
    }
}

#[rstest]
#[case::exact_capacity(10, 10)]
#[case::half_capacity(10, 5)]
#[case::single_seat(1, 1)]
#[case::large_zone(500, 200)]
#[tokio::test]
async fn reserving_up_to_capacity_drains_availability_to_zero_or_above(#[case] capacity: i64, #[case] quantity: i64) {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    store.init_zone(zone_id, capacity).await.unwrap();

    let outcome = store
        .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, quantity, quantity))
        .await
        .unwrap();

    assert_eq!(outcome.new_available, capacity - quantity);
}

#[rstest]
#[case::one_over(10, 11)]
#[case::double(5, 10)]
#[tokio::test]
async fn reserving_more_than_available_is_rejected(#[case] capacity: i64, #[case] quantity: i64) {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    store.init_zone(zone_id, capacity).await.unwrap();

    let err = store
        .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, quantity, quantity))
        .await
        .unwrap_err();

    assert!(matches!(err, ticketflow_core::errors::ServiceError::InsufficientStock(_)));
}

#[rstest]
#[case::cap_of_four_first_two_then_five(4, 2, 5)]
#[case::cap_of_one_first_one_then_one(1, 1, 1)]
#[tokio::test]
async fn per_user_cap_rejects_once_exceeded_and_leaves_counter_unchanged(
    #[case] max_per_user: i64,
    #[case] first_quantity: i64,
    #[case] second_quantity: i64,
) {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    store.init_zone(zone_id, 1_000).await.unwrap();

    let first = store
        .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, first_quantity, max_per_user))
        .await
        .unwrap();
    assert_eq!(first.new_user_reserved, first_quantity);

    let err = store
        .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, second_quantity, max_per_user))
        .await
        .unwrap_err();
    assert!(matches!(err, ticketflow_core::errors::ServiceError::QuotaExceeded(_)));

    // The rejected attempt must not have touched the user's counter: there
    // should still be exactly enough headroom left for the remainder.
    let remaining_headroom = max_per_user - first_quantity;
    if remaining_headroom > 0 {
        let retry = store
            .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, remaining_headroom, max_per_user))
            .await;
        assert!(retry.is_ok());
    }
}

#[rstest]
#[case::ten_seats_twenty_buyers(10, 20)]
#[case::three_seats_ten_buyers(3, 10)]
#[tokio::test]
async fn many_buyers_against_a_limited_zone_admit_exactly_capacity_successes(#[case] capacity: i64, #[case] buyers: usize) {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    store.init_zone(zone_id, capacity).await.unwrap();

    let mut successes = 0;
    let mut failures = 0;
    for _ in 0..buyers {
        let user_id = Uuid::new_v4();
        match store
            .reserve(reserve_request(Uuid::new_v4(), user_id, zone_id, event_id, 1, 1))
            .await
        {
            Ok(_) => successes += 1,
            Err(ticketflow_core::errors::ServiceError::InsufficientStock(_)) => failures += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(successes, capacity as usize);
    assert_eq!(failures, buyers - capacity as usize);
}

#[tokio::test]
async fn confirm_is_terminal_and_second_confirm_is_rejected() {
    let store = FakeInventoryStore::new();
    let zone_id = Uuid::new_v4();
    let event_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let booking_id = Uuid::new_v4();
    store.init_zone(zone_id, 10).await.unwrap();

    store
        .reserve(reserve_request(booking_id, user_id, zone_id, event_id, 1, 1))
        .await
        .unwrap();

    let before_confirm = store.get_reservation(booking_id).await.unwrap().unwrap();

    store.confirm(booking_id, user_id, "pay_123").await.unwrap();
    let err = store.confirm(booking_id, user_id, "pay_123").await.unwrap_err();
    assert!(matches!(
        err,
        ticketflow_core::errors::ServiceError::Conflict {
            reason: ticketflow_core::errors::ConflictReason::AlreadyConfirmed,
            ..
        }
    ));

    // Confirming doesn't change the zone's availability counter.
    let record = store.get_reservation(booking_id).await.unwrap().unwrap();
    assert_eq!(record.quantity, before_confirm.quantity);
}
