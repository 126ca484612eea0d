//! Health Check Endpoints
//!
//! - /health - Combined health status
//! - /health/live - Liveness probe

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

use crate::cache::CacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub checks: Vec<HealthCheck>,
}

#[derive(Clone)]
pub struct HealthState {
    /// `None` when running on the in-memory store
    pub pool: Option<PgPool>,
    pub cache: Arc<CacheStore>,
    pub version: Option<String>,
}

impl HealthState {
    pub fn new(pool: Option<PgPool>, cache: Arc<CacheStore>) -> Self {
        Self {
            pool,
            cache,
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

async fn check_database(pool: &PgPool) -> HealthCheck {
    let start = Instant::now();
    let result = sqlx::query_scalar::<sqlx::Postgres, i32>("SELECT 1").fetch_one(pool).await;

    HealthCheck {
        name: "postgres".to_string(),
        status: if result.is_ok() { HealthStatus::Up } else { HealthStatus::Down },
        message: result.err().map(|e| format!("Connection failed: {}", e)),
        duration_ms: Some(start.elapsed().as_millis() as u64),
    }
}

fn check_cache(cache: &CacheStore) -> HealthCheck {
    let stats = cache.stats();
    HealthCheck {
        name: "cache".to_string(),
        status: HealthStatus::Up,
        message: Some(format!("{} entries, {} hits, {} misses", stats.entries, stats.hits, stats.misses)),
        duration_ms: None,
    }
}

/// Combined health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<HealthState>) -> Response {
    let mut checks = vec![check_cache(&state.cache)];
    if let Some(pool) = &state.pool {
        checks.push(check_database(pool).await);
    }

    let status = if checks.iter().any(|c| c.status == HealthStatus::Down) {
        HealthStatus::Down
    } else {
        HealthStatus::Up
    };
    let status_code = match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        timestamp: Utc::now(),
        version: state.version.clone(),
        checks,
    };
    (status_code, Json(response)).into_response()
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn get_liveness() -> StatusCode {
    StatusCode::OK
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(get_health))
        .route("/live", get(get_liveness))
        .with_state(state)
}
