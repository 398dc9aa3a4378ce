//! Shared test scaffolding: an in-memory `InventoryStore` double for tests
//! that exercise the booking/saga layer without a live Redis, and an
//! in-memory SQLite connection for tests that only need the relational
//! schema.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use ticketflow_core::db;
use ticketflow_core::entities::booking::BookingStatus;
use ticketflow_core::errors::ServiceError;
use ticketflow_core::inventory::{
    ConfirmOutcome, InventoryStore, ReleaseOutcome, ReserveOutcome, ReserveRequest, ReservationRecord,
};
use uuid::Uuid;

/// Connects to an in-memory SQLite database and applies every migration,
/// mirroring how the teacher's own integration tests stand up a throwaway
/// schema for tests that don't need a real Postgres instance.
pub async fn test_db() -> sea_orm::DatabaseConnection {
    let pool = db::establish_connection("sqlite::memory:").await.expect("connect sqlite");
    db::run_migrations(&pool).await.expect("run migrations");
    pool
}

#[derive(Default)]
struct ZoneState {
    available: i64,
    per_user: HashMap<Uuid, i64>,
}

/// In-process stand-in for [`RedisInventoryStore`], enforcing the same
/// stock/quota/status rules the Lua scripts enforce, so saga and
/// reservation logic can be exercised without a Redis instance.
#[derive(Default)]
pub struct FakeInventoryStore {
    zones: Mutex<HashMap<Uuid, ZoneState>>,
    reservations: Mutex<HashMap<Uuid, ReservationRecord>>,
}

impl FakeInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for FakeInventoryStore {
    async fn init_zone(&self, zone_id: Uuid, capacity: i64) -> Result<(), ServiceError> {
        self.zones.lock().unwrap().insert(
            zone_id,
            ZoneState {
                available: capacity,
                per_user: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, ServiceError> {
        let mut zones = self.zones.lock().unwrap();
        let zone = zones
            .get_mut(&req.zone_id)
            .ok_or_else(|| ServiceError::ZoneUninitialized("zone has no availability counter".to_string()))?;

        if req.quantity <= 0 {
            return Err(ServiceError::Validation("quantity must be positive".to_string()));
        }
        if zone.available < req.quantity {
            return Err(ServiceError::InsufficientStock("not enough seats available in zone".to_string()));
        }
        let current_user = *zone.per_user.get(&req.user_id).unwrap_or(&0);
        if current_user + req.quantity > req.max_per_user {
            return Err(ServiceError::QuotaExceeded("reservation would exceed per-user limit".to_string()));
        }

        zone.available -= req.quantity;
        let new_user_reserved = current_user + req.quantity;
        zone.per_user.insert(req.user_id, new_user_reserved);
        let new_available = zone.available;

        self.reservations.lock().unwrap().insert(
            req.booking_id,
            ReservationRecord {
                booking_id: req.booking_id,
                user_id: req.user_id,
                zone_id: req.zone_id,
                event_id: req.event_id,
                show_id: req.show_id,
                quantity: req.quantity,
                unit_price: req.unit_price,
                status: BookingStatus::Reserved.as_str().to_string(),
                created_at: Utc::now(),
                expires_at: Utc::now() + chrono::Duration::seconds(req.ttl_seconds),
            },
        );

        Ok(ReserveOutcome {
            new_available,
            new_user_reserved,
        })
    }

    async fn release(&self, booking_id: Uuid, user_id: Uuid) -> Result<ReleaseOutcome, ServiceError> {
        let mut reservations = self.reservations.lock().unwrap();
        let record = reservations
            .get_mut(&booking_id)
            .ok_or_else(|| ServiceError::NotFound("reservation record not found or expired".to_string()))?;
        if record.status != BookingStatus::Reserved.as_str() {
            return Err(ServiceError::Conflict {
                reason: ticketflow_core::errors::ConflictReason::AlreadyReleased,
                message: "reservation is not in reserved status".to_string(),
            });
        }
        record.status = BookingStatus::Cancelled.as_str().to_string();

        let mut zones = self.zones.lock().unwrap();
        let zone = zones.get_mut(&record.zone_id).expect("zone exists for known reservation");
        zone.available += record.quantity;
        let entry = zone.per_user.entry(user_id).or_insert(0);
        *entry -= record.quantity;

        Ok(ReleaseOutcome {
            new_available: zone.available,
            new_user_reserved: *entry,
        })
    }

    async fn confirm(
        &self,
        booking_id: Uuid,
        _user_id: Uuid,
        _payment_id: &str,
    ) -> Result<ConfirmOutcome, ServiceError> {
        let mut reservations = self.reservations.lock().unwrap();
        let record = reservations
            .get_mut(&booking_id)
            .ok_or_else(|| ServiceError::NotFound("reservation record not found or expired".to_string()))?;
        if record.status == BookingStatus::Confirmed.as_str() {
            return Err(ServiceError::Conflict {
                reason: ticketflow_core::errors::ConflictReason::AlreadyConfirmed,
                message: "reservation is already confirmed".to_string(),
            });
        }
        record.status = BookingStatus::Confirmed.as_str().to_string();
        Ok(ConfirmOutcome {
            confirmed_at: Utc::now(),
        })
    }

    async fn get_reservation(&self, booking_id: Uuid) -> Result<Option<ReservationRecord>, ServiceError> {
        Ok(self.reservations.lock().unwrap().get(&booking_id).cloned())
    }
}
