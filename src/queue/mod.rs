//! Virtual queue: FIFO admission ordering per event plus the per-event
//! concurrency configuration the release worker reads.

pub mod pass;
pub mod release_worker;

use crate::errors::ServiceError;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

fn queue_key(event_id: Uuid) -> String {
    format!("queue:{event_id}:waiting")
}

fn queue_config_key(event_id: Uuid) -> String {
    format!("queue:config:{event_id}")
}

fn queue_pass_key(event_id: Uuid, user_id: Uuid) -> String {
    format!("queuepass:{event_id}:{user_id}")
}

fn queue_pass_scan_pattern(event_id: Uuid) -> String {
    format!("queuepass:{event_id}:*")
}

const ACTIVE_EVENTS_KEY: &str = "queue:active_events";
const CONFIG_CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventQueueConfig {
    pub max_concurrent: u32,
    pub pass_ttl_secs: i64,
}

struct CachedConfig {
    value: EventQueueConfig,
    fetched_at: Instant,
}

/// Redis-backed queue state, with a short-lived in-process cache over the
/// per-event concurrency config so the release worker isn't round-tripping
/// to Redis on every tick just to read two integers.
#[derive(Clone)]
pub struct QueueRepository {
    conn: ConnectionManager,
    config_cache: Arc<RwLock<std::collections::HashMap<Uuid, CachedConfig>>>,
    default_max_concurrent: u32,
    default_pass_ttl_secs: i64,
}

impl QueueRepository {
    pub fn new(conn: ConnectionManager, default_max_concurrent: u32, default_pass_ttl_secs: i64) -> Self {
        Self {
            conn,
            config_cache: Arc::new(RwLock::new(std::collections::HashMap::new())),
            default_max_concurrent,
            default_pass_ttl_secs,
        }
    }

    /// Joins the tail of the event's waiting line, returning the caller's
    /// 0-based position. Re-joining an already-queued user is a no-op that
    /// reports their existing position rather than moving them to the back.
    pub async fn join(&self, event_id: Uuid, user_id: Uuid) -> Result<i64, ServiceError> {
        let mut conn = self.conn.clone();
        let key = queue_key(event_id);

        let existing: Option<f64> = redis::cmd("ZSCORE")
            .arg(&key)
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await?;

        if existing.is_none() {
            let now = now_millis();
            redis::cmd("ZADD")
                .arg(&key)
                .arg("NX")
                .arg(now)
                .arg(user_id.to_string())
                .query_async::<_, ()>(&mut conn)
                .await?;
            redis::cmd("SADD")
                .arg(ACTIVE_EVENTS_KEY)
                .arg(event_id.to_string())
                .query_async::<_, ()>(&mut conn)
                .await?;
        }

        self.position(event_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::internal("just-joined user missing from queue"))
    }

    pub async fn position(&self, event_id: Uuid, user_id: Uuid) -> Result<Option<i64>, ServiceError> {
        let mut conn = self.conn.clone();
        let rank: Option<i64> = redis::cmd("ZRANK")
            .arg(queue_key(event_id))
            .arg(user_id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(rank)
    }

    pub async fn leave(&self, event_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("ZREM")
            .arg(queue_key(event_id))
            .arg(user_id.to_string())
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Pops up to `count` users from the head of the waiting line.
    pub async fn pop_front(&self, event_id: Uuid, count: u32) -> Result<Vec<Uuid>, ServiceError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = redis::cmd("ZPOPMIN")
            .arg(queue_key(event_id))
            .arg(count)
            .query_async(&mut conn)
            .await?;

        popped
            .into_iter()
            .map(|(member, _score)| {
                Uuid::parse_str(&member).map_err(|e| ServiceError::internal(format!("corrupt queue member: {e}")))
            })
            .collect()
    }

    pub async fn active_event_ids(&self) -> Result<Vec<Uuid>, ServiceError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = redis::cmd("SMEMBERS")
            .arg(ACTIVE_EVENTS_KEY)
            .query_async(&mut conn)
            .await?;
        Ok(raw.into_iter().filter_map(|s| Uuid::parse_str(&s).ok()).collect())
    }

    pub async fn set_config(&self, event_id: Uuid, config: EventQueueConfig) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("HSET")
            .arg(queue_config_key(event_id))
            .arg("max_concurrent")
            .arg(config.max_concurrent)
            .arg("pass_ttl_secs")
            .arg(config.pass_ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        self.config_cache.write().await.remove(&event_id);
        Ok(())
    }

    /// Reads the per-event concurrency config, serving from the
    /// in-process cache when fresh (spec: 30s cache window) and falling
    /// back to process-wide defaults when an event has none configured.
    pub async fn get_config(&self, event_id: Uuid) -> Result<EventQueueConfig, ServiceError> {
        if let Some(cached) = self.config_cache.read().await.get(&event_id) {
            if cached.fetched_at.elapsed() < CONFIG_CACHE_TTL {
                return Ok(cached.value);
            }
        }

        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, String> = redis::cmd("HGETALL")
            .arg(queue_config_key(event_id))
            .query_async(&mut conn)
            .await?;

        let config = if fields.is_empty() {
            EventQueueConfig {
                max_concurrent: self.default_max_concurrent,
                pass_ttl_secs: self.default_pass_ttl_secs,
            }
        } else {
            EventQueueConfig {
                max_concurrent: fields
                    .get("max_concurrent")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(self.default_max_concurrent),
                pass_ttl_secs: fields
                    .get("pass_ttl_secs")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(self.default_pass_ttl_secs),
            }
        };

        self.config_cache.write().await.insert(
            event_id,
            CachedConfig {
                value: config,
                fetched_at: Instant::now(),
            },
        );
        Ok(config)
    }

    /// Counts currently-active queue passes for an event via a pattern
    /// scan. Chosen over a maintained counter key because passes expire
    /// by TTL rather than through an explicit release-worker-owned
    /// decrement, so a counter would drift; `SCAN` stays correct at the
    /// cost of an O(active passes) sweep per tick.
    pub async fn count_active_passes(&self, event_id: Uuid) -> Result<i64, ServiceError> {
        let mut conn = self.conn.clone();
        let pattern = queue_pass_scan_pattern(event_id);
        let mut cursor: u64 = 0;
        let mut count: i64 = 0;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await?;
            count += keys.len() as i64;
            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }
        Ok(count)
    }

    /// Records that `user_id` was admitted for `event_id`, storing the
    /// actual signed pass token as the key's value so a later verifier can
    /// retrieve and check it, not just tell that *a* pass exists.
    pub async fn record_pass_issued(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        ttl_secs: i64,
        token: &str,
    ) -> Result<(), ServiceError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(queue_pass_key(event_id, user_id))
            .arg(token)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Retrieves the signed pass token issued to `user_id` for `event_id`,
    /// if one is still active.
    pub async fn get_pass_token(&self, event_id: Uuid, user_id: Uuid) -> Result<Option<String>, ServiceError> {
        let mut conn = self.conn.clone();
        let token: Option<String> = redis::cmd("GET")
            .arg(queue_pass_key(event_id, user_id))
            .query_async(&mut conn)
            .await?;
        Ok(token)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_pattern_is_scoped_to_event() {
        let event = Uuid::nil();
        assert_eq!(queue_pass_scan_pattern(event), format!("queuepass:{event}:*"));
    }
}
