//! Ticks over every event with queued users, admitting as many as the
//! configured concurrency budget allows by minting queue-pass tokens.
//!
//! Assumes a single running instance: two instances each reading "active
//! passes" independently would both compute headroom against the same
//! `max_concurrent` and double-admit.

use super::{pass, QueueRepository};
use crate::errors::ServiceError;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

pub struct ReleaseWorker {
    queue: QueueRepository,
    jwt_secret: String,
    release_interval: Duration,
    release_batch_size: u32,
}

impl ReleaseWorker {
    pub fn new(
        queue: QueueRepository,
        jwt_secret: String,
        release_interval: Duration,
        release_batch_size: u32,
    ) -> Self {
        Self {
            queue,
            jwt_secret,
            release_interval,
            release_batch_size,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.release_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "release worker tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("release worker shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Steps: read the event's cached config, count active passes, compute
    /// headroom, pop that many users off the queue head, mint and record a
    /// pass for each.
    pub async fn tick(&self) -> Result<(), ServiceError> {
        let now = chrono::Utc::now().timestamp();
        for event_id in self.queue.active_event_ids().await? {
            let config = self.queue.get_config(event_id).await?;
            let active = self.queue.count_active_passes(event_id).await?;
            let headroom = (config.max_concurrent as i64 - active).max(0) as u32;
            let release_count = headroom.min(self.release_batch_size);
            if release_count == 0 {
                continue;
            }

            let released = self.queue.pop_front(event_id, release_count).await?;
            for user_id in &released {
                let token = pass::mint(*user_id, event_id, now, config.pass_ttl_secs, &self.jwt_secret)?;
                self.queue
                    .record_pass_issued(event_id, *user_id, config.pass_ttl_secs, &token)
                    .await?;
                info!(%event_id, %user_id, "admitted user from queue");
            }
        }
        Ok(())
    }
}
