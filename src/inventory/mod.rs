//! Per-zone inventory, per-user quota, and reservation records, mutated
//! only through the atomic script set in [`scripts`].

pub mod scripts;

use crate::errors::ServiceError;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

pub fn zone_availability_key(zone_id: Uuid) -> String {
    format!("zone:availability:{zone_id}")
}

pub fn user_reservation_counter_key(user_id: Uuid, event_id: Uuid) -> String {
    format!("user:reservations:{user_id}:{event_id}")
}

pub fn reservation_key(booking_id: Uuid) -> String {
    format!("reservation:{booking_id}")
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub zone_id: Uuid,
    pub event_id: Uuid,
    pub show_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub max_per_user: i64,
    pub ttl_seconds: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveOutcome {
    pub new_available: i64,
    pub new_user_reserved: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub new_available: i64,
    pub new_user_reserved: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationRecord {
    pub booking_id: Uuid,
    pub user_id: Uuid,
    pub zone_id: Uuid,
    pub event_id: Uuid,
    pub show_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One of the fixed failure codes the atomic scripts can return. Mapped
/// 1:1 onto [`ServiceError`] by each call site, since the right
/// `ServiceError` kind depends on which operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFailure {
    InvalidQuantity,
    ZoneNotFound,
    InsufficientStock,
    UserLimitExceeded,
    ReservationNotFound,
    InvalidBookingId,
    InvalidUserId,
    AlreadyReleased,
    AlreadyConfirmed,
}

impl ScriptFailure {
    fn parse(code: &str) -> Self {
        match code {
            "INVALID_QUANTITY" => Self::InvalidQuantity,
            "ZONE_NOT_FOUND" => Self::ZoneNotFound,
            "INSUFFICIENT_STOCK" => Self::InsufficientStock,
            "USER_LIMIT_EXCEEDED" => Self::UserLimitExceeded,
            "INVALID_BOOKING_ID" => Self::InvalidBookingId,
            "INVALID_USER_ID" => Self::InvalidUserId,
            "ALREADY_RELEASED" => Self::AlreadyReleased,
            "ALREADY_CONFIRMED" => Self::AlreadyConfirmed,
            _ => Self::ReservationNotFound,
        }
    }
}

impl From<ScriptFailure> for ServiceError {
    fn from(failure: ScriptFailure) -> Self {
        match failure {
            ScriptFailure::InvalidQuantity => {
                ServiceError::Validation("quantity must be positive".to_string())
            }
            ScriptFailure::ZoneNotFound => {
                ServiceError::ZoneUninitialized("zone has no availability counter".to_string())
            }
            ScriptFailure::InsufficientStock => {
                ServiceError::InsufficientStock("not enough seats available in zone".to_string())
            }
            ScriptFailure::UserLimitExceeded => {
                ServiceError::QuotaExceeded("reservation would exceed per-user limit".to_string())
            }
            ScriptFailure::ReservationNotFound => {
                ServiceError::NotFound("reservation record not found or expired".to_string())
            }
            ScriptFailure::InvalidBookingId | ScriptFailure::InvalidUserId => {
                ServiceError::Validation("reservation ownership mismatch".to_string())
            }
            ScriptFailure::AlreadyReleased => ServiceError::Conflict {
                reason: crate::errors::ConflictReason::AlreadyReleased,
                message: "reservation is not in reserved status".to_string(),
            },
            ScriptFailure::AlreadyConfirmed => ServiceError::Conflict {
                reason: crate::errors::ConflictReason::AlreadyConfirmed,
                message: "reservation is already confirmed".to_string(),
            },
        }
    }
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn init_zone(&self, zone_id: Uuid, capacity: i64) -> Result<(), ServiceError>;
    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, ServiceError>;
    async fn release(&self, booking_id: Uuid, user_id: Uuid) -> Result<ReleaseOutcome, ServiceError>;
    async fn confirm(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        payment_id: &str,
    ) -> Result<ConfirmOutcome, ServiceError>;
    async fn get_reservation(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<ReservationRecord>, ServiceError>;
}

/// `InventoryStore` backed by Redis, using the scripts in [`scripts`] for
/// every mutating operation.
#[derive(Clone)]
pub struct RedisInventoryStore {
    conn: ConnectionManager,
}

impl RedisInventoryStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ServiceError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| ServiceError::DependencyUnavailable(format!("redis: {e}")))?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl InventoryStore for RedisInventoryStore {
    async fn init_zone(&self, zone_id: Uuid, capacity: i64) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(zone_availability_key(zone_id))
            .arg(capacity)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn reserve(&self, req: ReserveRequest) -> Result<ReserveOutcome, ServiceError> {
        let mut conn = self.conn.clone();
        let script = scripts::reserve_script();
        let result: Vec<redis::Value> = script
            .key(zone_availability_key(req.zone_id))
            .key(user_reservation_counter_key(req.user_id, req.event_id))
            .key(reservation_key(req.booking_id))
            .arg(req.quantity)
            .arg(req.max_per_user)
            .arg(req.user_id.to_string())
            .arg(req.booking_id.to_string())
            .arg(req.zone_id.to_string())
            .arg(req.event_id.to_string())
            .arg(req.show_id.to_string())
            .arg(req.unit_price.to_string())
            .arg(req.ttl_seconds)
            .invoke_async(&mut conn)
            .await?;

        parse_reserve_result(result)
    }

    async fn release(&self, booking_id: Uuid, user_id: Uuid) -> Result<ReleaseOutcome, ServiceError> {
        let mut conn = self.conn.clone();

        let record = self
            .get_reservation(booking_id)
            .await?
            .ok_or_else(|| ServiceError::from(ScriptFailure::ReservationNotFound))?;

        let script = scripts::release_script();
        let result: Vec<redis::Value> = script
            .key(zone_availability_key(record.zone_id))
            .key(user_reservation_counter_key(user_id, record.event_id))
            .key(reservation_key(booking_id))
            .arg(booking_id.to_string())
            .arg(user_id.to_string())
            .invoke_async(&mut conn)
            .await?;

        parse_release_result(result)
    }

    async fn confirm(
        &self,
        booking_id: Uuid,
        user_id: Uuid,
        payment_id: &str,
    ) -> Result<ConfirmOutcome, ServiceError> {
        let mut conn = self.conn.clone();
        let script = scripts::confirm_script();
        let result: Vec<redis::Value> = script
            .key(reservation_key(booking_id))
            .arg(booking_id.to_string())
            .arg(user_id.to_string())
            .arg(payment_id)
            .invoke_async(&mut conn)
            .await?;

        parse_confirm_result(result)
    }

    async fn get_reservation(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<ReservationRecord>, ServiceError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(reservation_key(booking_id))
            .query_async(&mut conn)
            .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(ReservationRecord {
            booking_id: parse_uuid(&fields, "booking_id")?,
            user_id: parse_uuid(&fields, "user_id")?,
            zone_id: parse_uuid(&fields, "zone_id")?,
            event_id: parse_uuid(&fields, "event_id")?,
            show_id: parse_uuid(&fields, "show_id")?,
            quantity: parse_field(&fields, "quantity")?,
            unit_price: parse_field(&fields, "unit_price")?,
            status: fields
                .get("status")
                .cloned()
                .ok_or_else(|| ServiceError::internal("reservation hash missing status"))?,
            created_at: parse_timestamp(&fields, "created_at")?,
            expires_at: parse_timestamp(&fields, "expires_at")?,
        }))
    }
}

fn parse_uuid(fields: &HashMap<String, String>, key: &str) -> Result<Uuid, ServiceError> {
    fields
        .get(key)
        .ok_or_else(|| ServiceError::internal(format!("reservation hash missing {key}")))
        .and_then(|v| Uuid::parse_str(v).map_err(ServiceError::internal))
}

fn parse_field<T: FromStr>(fields: &HashMap<String, String>, key: &str) -> Result<T, ServiceError> {
    fields
        .get(key)
        .ok_or_else(|| ServiceError::internal(format!("reservation hash missing {key}")))
        .and_then(|v| v.parse::<T>().map_err(|_| ServiceError::internal(format!("bad {key}"))))
}

fn parse_timestamp(fields: &HashMap<String, String>, key: &str) -> Result<DateTime<Utc>, ServiceError> {
    let secs: i64 = parse_field(fields, key)?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ServiceError::internal(format!("invalid timestamp in {key}")))
}

fn parse_reserve_result(result: Vec<redis::Value>) -> Result<ReserveOutcome, ServiceError> {
    let ok = as_bool(&result[0])?;
    if !ok {
        return Err(ScriptFailure::parse(&as_string(&result[1])?).into());
    }
    Ok(ReserveOutcome {
        new_available: as_int(&result[1])?,
        new_user_reserved: as_int(&result[2])?,
    })
}

fn parse_release_result(result: Vec<redis::Value>) -> Result<ReleaseOutcome, ServiceError> {
    let ok = as_bool(&result[0])?;
    if !ok {
        return Err(ScriptFailure::parse(&as_string(&result[1])?).into());
    }
    Ok(ReleaseOutcome {
        new_available: as_int(&result[1])?,
        new_user_reserved: as_int(&result[2])?,
    })
}

fn parse_confirm_result(result: Vec<redis::Value>) -> Result<ConfirmOutcome, ServiceError> {
    let ok = as_bool(&result[0])?;
    if !ok {
        return Err(ScriptFailure::parse(&as_string(&result[1])?).into());
    }
    let confirmed_at = as_int(&result[2])?;
    Ok(ConfirmOutcome {
        confirmed_at: Utc
            .timestamp_opt(confirmed_at, 0)
            .single()
            .ok_or_else(|| ServiceError::internal("invalid confirmed_at"))?,
    })
}

fn as_bool(value: &redis::Value) -> Result<bool, ServiceError> {
    Ok(as_int(value)? == 1)
}

fn as_int(value: &redis::Value) -> Result<i64, ServiceError> {
    match value {
        redis::Value::Int(i) => Ok(*i),
        redis::Value::Data(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ServiceError::internal("expected integer script result")),
        _ => Err(ServiceError::internal("unexpected script result shape")),
    }
}

fn as_string(value: &redis::Value) -> Result<String, ServiceError> {
    match value {
        redis::Value::Data(bytes) => Ok(String::from_utf8_lossy(bytes).to_string()),
        redis::Value::Status(s) => Ok(s.clone()),
        _ => Err(ServiceError::internal("expected string script result")),
    }
}
