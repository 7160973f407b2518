//! Readiness of the persistence layer
//!
//! [`Persistence::health`](crate::state::Persistence::health) probes each
//! configured backend and reports, per entity, which dialect its repository
//! is bound to alongside the degraded counters. With the `http` feature the
//! report doubles as liveness and readiness handlers.

use std::collections::BTreeMap;
use std::time::Duration;

use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::config::DatabaseConfig;
use crate::degraded::CounterSnapshot;
use crate::dialect::Dialect;

/// Status of one backend dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyStatus {
    /// Dependency answered its probe
    pub healthy: bool,

    /// Whether the layer may run without it
    pub optional: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DependencyStatus {
    pub(crate) fn up(optional: bool) -> Self {
        Self {
            healthy: true,
            optional,
            message: Some("Connected".to_string()),
        }
    }

    pub(crate) fn down(optional: bool, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            optional,
            message: Some(message.into()),
        }
    }
}

/// PostgreSQL pool usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolHealth {
    /// Connections currently open
    pub size: u32,

    /// Open connections not checked out
    pub idle: usize,

    pub max_size: u32,
    pub min_size: u32,

    /// Pool has headroom left
    pub healthy: bool,

    /// Open connections relative to `max_size` (0-100)
    pub utilization_percent: f32,
}

impl PoolHealth {
    pub fn from_pool(pool: &PgPool, config: &DatabaseConfig) -> Self {
        let size = pool.size();
        let max_size = config.max_connections;

        let utilization_percent = if max_size > 0 {
            ((size as f32 / max_size as f32) * 100.0).min(100.0)
        } else {
            0.0
        };

        Self {
            size,
            idle: pool.num_idle(),
            max_size,
            min_size: config.min_connections,
            healthy: size < max_size || pool.num_idle() > 0,
            utilization_percent,
        }
    }
}

/// Point-in-time report on the persistence layer
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceHealth {
    /// Every required dependency is healthy
    pub ready: bool,

    pub service: String,

    /// Dialect each entity's repository is bound to, keyed by plural name
    pub entities: BTreeMap<&'static str, Dialect>,

    /// Probed dependencies: `database`, `document_store`
    pub dependencies: BTreeMap<&'static str, DependencyStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool: Option<PoolHealth>,

    /// Counters and the database flag as seen by the aggregate gateway
    pub counters: CounterSnapshot,
}

impl PersistenceHealth {
    /// Readiness from dependency statuses: optional ones never block it
    pub(crate) fn compute_ready(dependencies: &BTreeMap<&'static str, DependencyStatus>) -> bool {
        dependencies
            .values()
            .all(|status| status.healthy || status.optional)
    }
}

/// `SELECT 1` against the pool, bounded by `timeout`
pub(crate) async fn probe_database(pool: &PgPool, timeout: Duration, optional: bool) -> DependencyStatus {
    match tokio::time::timeout(timeout, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => DependencyStatus::up(optional),
        Ok(Err(e)) => {
            tracing::error!("Database health check failed: {}", e);
            DependencyStatus::down(optional, format!("Connection failed: {e}"))
        }
        Err(_) => DependencyStatus::down(optional, format!("Probe timed out after {timeout:?}")),
    }
}

/// `ping` against the document database, bounded by `timeout`
pub(crate) async fn probe_document_store(
    database: &mongodb::Database,
    timeout: Duration,
    optional: bool,
) -> DependencyStatus {
    match tokio::time::timeout(timeout, database.run_command(doc! { "ping": 1 })).await {
        Ok(Ok(_)) => DependencyStatus::up(optional),
        Ok(Err(e)) => {
            tracing::error!("Document store health check failed: {}", e);
            DependencyStatus::down(optional, format!("Ping failed: {e}"))
        }
        Err(_) => DependencyStatus::down(optional, format!("Probe timed out after {timeout:?}")),
    }
}

#[cfg(feature = "http")]
pub use handlers::{health, readiness, HealthResponse};

#[cfg(feature = "http")]
mod handlers {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
    use serde::{Deserialize, Serialize};

    use crate::state::Persistence;

    /// Liveness response
    #[derive(Debug, Serialize, Deserialize)]
    pub struct HealthResponse {
        pub status: String,
        pub service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub version: Option<String>,
    }

    /// Liveness probe: 200 whenever the process is up
    pub async fn health(State(persistence): State<Arc<Persistence>>) -> impl IntoResponse {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: persistence.config().service.name.clone(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        };

        (StatusCode::OK, Json(response))
    }

    /// Readiness probe: 200 when every required backend answers, 503 otherwise
    pub async fn readiness(State(persistence): State<Arc<Persistence>>) -> impl IntoResponse {
        let report = persistence.health().await;
        let status = if report.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        (status, Json(report))
    }
}
