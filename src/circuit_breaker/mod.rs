//! Generic circuit breaker guarding calls to the message bus and other
//! remote dependencies so a down dependency degrades the caller instead of
//! wedging its tick loop.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    #[error("circuit is open, rejecting call")]
    Open,

    #[error(transparent)]
    Inner(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: usize,
    pub reset_timeout: Duration,
    pub half_open_max_trials: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            half_open_max_trials: 1,
        }
    }
}

/// Guards calls to a remote dependency, transitioning Closed -> Open on
/// repeated failures and Open -> HalfOpen -> Closed once `reset_timeout`
/// has elapsed and a trial call succeeds.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicUsize,
    half_open_trials: AtomicUsize,
    last_failure_time: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicUsize::new(0),
            half_open_trials: AtomicUsize::new(0),
            last_failure_time: RwLock::new(None),
        })
    }

    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let state = *self.state.read().await;
            match state {
                CircuitState::Open => {
                    let should_try_reset = {
                        let last_failure = self.last_failure_time.read().await;
                        last_failure
                            .map(|t| t.elapsed() >= self.config.reset_timeout)
                            .unwrap_or(false)
                    };

                    if should_try_reset {
                        let mut state = self.state.write().await;
                        if *state == CircuitState::Open {
                            *state = CircuitState::HalfOpen;
                            self.half_open_trials.store(0, Ordering::Relaxed);
                            info!("circuit breaker transitioned to half-open");
                        }
                    } else {
                        return Err(CircuitBreakerError::Open);
                    }
                }
                CircuitState::HalfOpen => {
                    let trials = self.half_open_trials.fetch_add(1, Ordering::Relaxed) + 1;
                    if trials > self.config.half_open_max_trials {
                        return Err(CircuitBreakerError::Open);
                    }
                }
                CircuitState::Closed => {}
            }
        }

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(CircuitBreakerError::Inner(e))
            }
        }
    }

    async fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
        let mut state = self.state.write().await;
        if *state == CircuitState::HalfOpen {
            *state = CircuitState::Closed;
            info!("circuit breaker closed after successful trial");
        }
        *self.last_failure_time.write().await = None;
    }

    async fn record_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.config.failure_threshold {
            let mut state = self.state.write().await;
            if *state != CircuitState::Open {
                *state = CircuitState::Open;
                *self.last_failure_time.write().await = Some(Instant::now());
                warn!(failures, "circuit breaker opened");
            }
        }
    }

    pub async fn is_open(&self) -> bool {
        *self.state.read().await == CircuitState::Open
    }

    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
        *self.last_failure_time.write().await = None;
    }
}
