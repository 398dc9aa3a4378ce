//! Minimal operational surface: a single `/healthz` that checks the
//! database and Redis, nothing else. The booking engine has no public
//! REST surface of its own, so this and `/metrics` are the only routes.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use redis::aio::ConnectionManager;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    pub db: Arc<DatabaseConnection>,
    pub redis: ConnectionManager,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/healthz", get(healthz)).with_state(state)
}

async fn healthz(State(state): State<HealthState>) -> impl IntoResponse {
    let db_ok = state
        .db
        .execute(Statement::from_string(
            state.db.get_database_backend(),
            "SELECT 1".to_string(),
        ))
        .await
        .map(|_| true)
        .unwrap_or_else(|err| {
            warn!(error = %err, "healthz: database check failed");
            false
        });

    let mut redis_conn = state.redis.clone();
    let redis_ok = redis::cmd("PING")
        .query_async::<_, String>(&mut redis_conn)
        .await
        .map(|_| true)
        .unwrap_or_else(|err| {
            warn!(error = %err, "healthz: redis check failed");
            false
        });

    let status = if db_ok && redis_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if db_ok && redis_ok { "up" } else { "degraded" },
            "database": db_ok,
            "redis": redis_ok,
        })),
    )
}
