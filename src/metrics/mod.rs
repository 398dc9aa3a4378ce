//! Prometheus metrics exposed at `/metrics`. Counters are registered once
//! via `lazy_static` and incremented from wherever the corresponding event
//! happens; this module only owns registration and the text-format handler.

use axum::{http::header, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref RESERVATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("reservations_total", "Reservation attempts by outcome"),
        &["outcome"]
    )
    .expect("metric can be created");
    pub static ref BOOKINGS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("bookings_total", "Booking lifecycle transitions"),
        &["status"]
    )
    .expect("metric can be created");
    pub static ref OUTBOX_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("outbox_published_total", "Outbox rows published by topic"),
        &["topic"]
    )
    .expect("metric can be created");
    pub static ref OUTBOX_DEAD_LETTERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("outbox_dead_lettered_total", "Outbox rows moved to the dead letter table"),
        &["topic"]
    )
    .expect("metric can be created");
    pub static ref QUEUE_ADMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("queue_admissions_total", "Queue passes issued by event"),
        &["event_id"]
    )
    .expect("metric can be created");
    pub static ref SAGA_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("saga_outcomes_total", "Saga terminal outcomes"),
        &["saga_type", "outcome"]
    )
    .expect("metric can be created");
}

/// Registers every collector. Call once at startup before spawning
/// anything that might increment a metric.
pub fn init() {
    REGISTRY
        .register(Box::new(RESERVATIONS_TOTAL.clone()))
        .expect("collector not already registered");
    REGISTRY
        .register(Box::new(BOOKINGS_TOTAL.clone()))
        .expect("collector not already registered");
    REGISTRY
        .register(Box::new(OUTBOX_PUBLISHED_TOTAL.clone()))
        .expect("collector not already registered");
    REGISTRY
        .register(Box::new(OUTBOX_DEAD_LETTERED_TOTAL.clone()))
        .expect("collector not already registered");
    REGISTRY
        .register(Box::new(QUEUE_ADMISSIONS_TOTAL.clone()))
        .expect("collector not already registered");
    REGISTRY
        .register(Box::new(SAGA_OUTCOMES_TOTAL.clone()))
        .expect("collector not already registered");
}

pub fn router() -> Router {
    Router::new().route("/metrics", get(export))
}

async fn export() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("prometheus text encoding cannot fail for well-formed metrics");

    ([(header::CONTENT_TYPE, encoder.format_type().to_string())], buffer)
}
