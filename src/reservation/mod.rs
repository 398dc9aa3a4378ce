//! Booking lifecycle on top of the atomic inventory store: reserve,
//! confirm, cancel, and sweep for expiry, each co-committing a relational
//! row and an outbox message.

pub mod idempotency;

use crate::bus::topics::{booking_event_type, BOOKING_EVENTS};
use crate::entities::booking::{self, BookingStatus};
use crate::errors::{ConflictReason, ServiceError};
use crate::inventory::{InventoryStore, ReserveRequest};
use crate::outbox;
use crate::queue::pass;
use chrono::{Duration as ChronoDuration, Utc};
use idempotency::{Claim, IdempotencyStore};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelBehavior, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ReserveSeatsRequest {
    pub idempotency_key: String,
    pub user_id: Uuid,
    pub zone_id: Uuid,
    pub event_id: Uuid,
    pub show_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    /// Signed queue-pass token proving this user was admitted past the
    /// virtual queue for `event_id`. Required whenever the event has queue
    /// admission enabled; checked against `queue_pass_secret` in
    /// [`ReservationService::reserve_seats`].
    pub queue_pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingResult {
    pub booking_id: Uuid,
    pub status: String,
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    inventory: Arc<dyn InventoryStore>,
    idempotency: IdempotencyStore,
    reservation_ttl_secs: i64,
    max_per_user: i64,
    queue_pass_secret: String,
}

impl ReservationService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        inventory: Arc<dyn InventoryStore>,
        idempotency: IdempotencyStore,
        reservation_ttl_secs: i64,
        max_per_user: i64,
        queue_pass_secret: String,
    ) -> Self {
        Self {
            db,
            inventory,
            idempotency,
            reservation_ttl_secs,
            max_per_user,
            queue_pass_secret,
        }
    }

    /// Checks that `req` carries a queue pass that verifies against the
    /// configured secret and was minted for the same event being reserved.
    /// Any failure (missing, expired, forged, or issued for a different
    /// event) is reported as `QueueRequired` rather than `Unauthorized`,
    /// since from the caller's perspective the remedy is the same: go
    /// through the queue and obtain a valid pass.
    fn require_queue_pass(&self, req: &ReserveSeatsRequest) -> Result<(), ServiceError> {
        let claims = pass::verify(&req.queue_pass, &self.queue_pass_secret)
            .map_err(|err| ServiceError::QueueRequired(format!("queue pass invalid: {err}")))?;
        if claims.event_id != req.event_id {
            return Err(ServiceError::QueueRequired(
                "queue pass was not issued for this event".to_string(),
            ));
        }
        if claims.user_id != req.user_id {
            return Err(ServiceError::QueueRequired(
                "queue pass was not issued to this user".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn reserve_seats(&self, req: ReserveSeatsRequest) -> Result<BookingResult, ServiceError> {
        self.require_queue_pass(&req)?;

        if let Claim::Replay(cached) = self
            .idempotency
            .claim::<BookingResult>("reserve_seats", &req.idempotency_key)
            .await?
        {
            return Ok(cached);
        }

        let booking_id = Uuid::new_v4();
        let outcome = self
            .inventory
            .reserve(ReserveRequest {
                booking_id,
                user_id: req.user_id,
                zone_id: req.zone_id,
                event_id: req.event_id,
                show_id: req.show_id,
                quantity: req.quantity,
                unit_price: req.unit_price,
                max_per_user: self.max_per_user,
                ttl_seconds: self.reservation_ttl_secs,
            })
            .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.idempotency.release("reserve_seats", &req.idempotency_key).await?;
                return Err(err);
            }
        };

        let expires_at = Utc::now() + ChronoDuration::seconds(self.reservation_ttl_secs);
        let total = req.unit_price * Decimal::from(req.quantity);

        let write: Result<(), ServiceError> = async {
            let txn = self.db.begin().await?;
            let model = booking::ActiveModel {
                id: Set(booking_id),
                tenant: Set("default".to_string()),
                user_id: Set(req.user_id),
                event_id: Set(req.event_id),
                show_id: Set(req.show_id),
                zone_id: Set(req.zone_id),
                quantity: Set(req.quantity as i32),
                unit_price: Set(req.unit_price),
                total: Set(total),
                currency: Set("USD".to_string()),
                status: Set(BookingStatus::Reserved.as_str().to_string()),
                reservation_token: Set(booking_id.to_string()),
                reference_id: Set(req.idempotency_key.clone()),
                expires_at: Set(Some(expires_at)),
                ..ActiveModelBehavior::new()
            };
            model.insert(&txn).await?;

            outbox::enqueue(
                &txn,
                "booking",
                booking_id,
                booking_event_type::RESERVED,
                &booking_id.to_string(),
                BOOKING_EVENTS,
                serde_json::json!({
                    "booking_id": booking_id,
                    "user_id": req.user_id,
                    "zone_id": req.zone_id,
                    "event_id": req.event_id,
                    "quantity": req.quantity,
                    "available": outcome.new_available,
                }),
            )
            .await?;
            txn.commit().await?;
            Ok(())
        }
        .await;

        if let Err(err) = write {
            self.inventory.release(booking_id, req.user_id).await?;
            self.idempotency.release("reserve_seats", &req.idempotency_key).await?;
            return Err(err);
        }

        let result = BookingResult {
            booking_id,
            status: BookingStatus::Reserved.as_str().to_string(),
            expires_at: Some(expires_at),
        };
        self.idempotency.store("reserve_seats", &req.idempotency_key, &result).await?;
        info!(%booking_id, %req.user_id, %req.zone_id, "seats reserved");
        Ok(result)
    }

    pub async fn confirm_booking(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        payment_id: &str,
    ) -> Result<BookingResult, ServiceError> {
        self.inventory.confirm(booking_id, user_id, payment_id).await?;

        let txn = self.db.begin().await?;
        let booking = booking::Entity::find_by_id(booking_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("booking {booking_id} not found")))?;

        if booking.status == BookingStatus::Confirmed.as_str() {
            return Err(ServiceError::Conflict {
                reason: ConflictReason::AlreadyConfirmed,
                message: "booking is already confirmed".to_string(),
            });
        }

        let now = Utc::now();
        let mut active: booking::ActiveModel = booking.into();
        active.status = Set(BookingStatus::Confirmed.as_str().to_string());
        active.confirmed_at = Set(Some(now));
        active.payment_id = Set(Some(payment_id.to_string()));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            "booking",
            booking_id,
            booking_event_type::CONFIRMED,
            &booking_id.to_string(),
            BOOKING_EVENTS,
            serde_json::json!({ "booking_id": booking_id, "user_id": user_id, "payment_id": payment_id }),
        )
        .await?;
        txn.commit().await?;

        info!(%booking_id, "booking confirmed");
        Ok(BookingResult {
            booking_id,
            status: BookingStatus::Confirmed.as_str().to_string(),
            expires_at: None,
        })
    }

    pub async fn cancel_booking(&self, booking_id: Uuid, user_id: Uuid) -> Result<BookingResult, ServiceError> {
        self.inventory.release(booking_id, user_id).await?;

        let txn = self.db.begin().await?;
        let booking = booking::Entity::find_by_id(booking_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("booking {booking_id} not found")))?;

        let now = Utc::now();
        let mut active: booking::ActiveModel = booking.into();
        active.status = Set(BookingStatus::Cancelled.as_str().to_string());
        active.cancelled_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        outbox::enqueue(
            &txn,
            "booking",
            booking_id,
            booking_event_type::CANCELLED,
            &booking_id.to_string(),
            BOOKING_EVENTS,
            serde_json::json!({ "booking_id": booking_id, "user_id": user_id }),
        )
        .await?;
        txn.commit().await?;

        info!(%booking_id, "booking cancelled");
        Ok(BookingResult {
            booking_id,
            status: BookingStatus::Cancelled.as_str().to_string(),
            expires_at: None,
        })
    }

    /// Finds up to `batch_size` reserved bookings whose hold has lapsed,
    /// releases their inventory, and marks them expired. Returns how many
    /// were swept so a caller (or test) can assert forward progress.
    pub async fn expire_sweep(&self, batch_size: u64) -> Result<u64, ServiceError> {
        let now = Utc::now();
        let expired = booking::Entity::find()
            .filter(booking::Column::Status.eq(BookingStatus::Reserved.as_str()))
            .filter(booking::Column::ExpiresAt.lte(now))
            .order_by_asc(booking::Column::ExpiresAt)
            .limit(batch_size)
            .all(self.db.as_ref())
            .await?;

        let mut swept = 0u64;
        for booking in expired {
            let booking_id = booking.id;
            let user_id = booking.user_id;

            if let Err(err) = self.inventory.release(booking_id, user_id).await {
                if !matches!(err, ServiceError::NotFound(_) | ServiceError::Conflict { .. }) {
                    return Err(err);
                }
            }

            let txn = self.db.begin().await?;
            let mut active: booking::ActiveModel = booking.into();
            active.status = Set(BookingStatus::Expired.as_str().to_string());
            active.updated_at = Set(now);
            active.update(&txn).await?;

            outbox::enqueue(
                &txn,
                "booking",
                booking_id,
                booking_event_type::EXPIRED,
                &booking_id.to_string(),
                BOOKING_EVENTS,
                serde_json::json!({ "booking_id": booking_id, "user_id": user_id }),
            )
            .await?;
            txn.commit().await?;
            swept += 1;
        }

        if swept > 0 {
            info!(count = swept, "swept expired reservations");
        }
        Ok(swept)
    }
}
