//! Idempotency guard: the first caller to present a given key wins and
//! its result is cached; every later caller within the TTL window gets
//! the cached result back instead of re-running the operation.

use crate::errors::{ConflictReason, ServiceError};
use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};

fn idempotency_key(scope: &str, key: &str) -> String {
    format!("idempotency:{scope}:{key}")
}

#[derive(Clone)]
pub struct IdempotencyStore {
    conn: ConnectionManager,
    ttl_seconds: usize,
}

pub enum Claim<T> {
    /// No prior attempt under this key; caller should proceed and then
    /// call `store` with the result.
    Proceed,
    /// A prior attempt already completed; here is its cached result.
    Replay(T),
}

impl IdempotencyStore {
    pub fn new(conn: ConnectionManager, ttl_seconds: usize) -> Self {
        Self { conn, ttl_seconds }
    }

    /// Attempts to claim `key` for `scope`. Uses `SET NX` so the claim and
    /// the reservation-of-the-right-to-proceed happen atomically; a
    /// concurrent duplicate request loses the race and is told to replay.
    pub async fn claim<T: DeserializeOwned>(&self, scope: &str, key: &str) -> Result<Claim<T>, ServiceError> {
        let mut conn = self.conn.clone();
        let set: Option<String> = redis::cmd("SET")
            .arg(idempotency_key(scope, key))
            .arg("in_progress")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async(&mut conn)
            .await?;

        if set.is_some() {
            return Ok(Claim::Proceed);
        }

        let existing: Option<String> = redis::cmd("GET")
            .arg(idempotency_key(scope, key))
            .query_async(&mut conn)
            .await?;

        match existing {
            // Another request is still executing under this key; it has not
            // stored a result yet, so there is nothing to replay. Reporting
            // this as a conflict stops us from silently letting a second
            // concurrent caller re-run the guarded operation.
            Some(raw) if raw == "in_progress" => Err(ServiceError::Conflict {
                reason: ConflictReason::IdempotencyReplay,
                message: format!("a request with idempotency key {key} is already in progress"),
            }),
            Some(raw) => {
                let value: T = serde_json::from_str(&raw)?;
                Ok(Claim::Replay(value))
            }
            // The key vanished between our failed SET NX and this GET (TTL
            // expiry or a concurrent release); safe to proceed as the first
            // claimant.
            None => Ok(Claim::Proceed),
        }
    }

    pub async fn store<T: Serialize>(&self, scope: &str, key: &str, value: &T) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        let serialized = serde_json::to_string(value)?;
        redis::cmd("SET")
            .arg(idempotency_key(scope, key))
            .arg(serialized)
            .arg("EX")
            .arg(self.ttl_seconds)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Releases a claim without caching a result, used when the guarded
    /// operation itself failed so a retry with the same key is allowed.
    pub async fn release(&self, scope: &str, key: &str) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL")
            .arg(idempotency_key(scope, key))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
