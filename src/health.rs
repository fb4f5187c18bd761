//! HTTP health endpoint.
//!
//! `GET /health` runs every registered check. All passing yields
//! `200 {"checksRun": n}`; any failure yields `503` with the failing names.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tracing::{info, warn};

use crate::bus::MessageConsumer;
use crate::config::HealthConfig;

/// A named liveness predicate.
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    fn is_healthy(&self) -> bool;
}

/// Healthy while the consumer holds a broker connection.
pub struct ConsumerHealth {
    consumer: Arc<dyn MessageConsumer>,
}

impl ConsumerHealth {
    pub fn new(consumer: Arc<dyn MessageConsumer>) -> Self {
        Self { consumer }
    }
}

impl HealthCheck for ConsumerHealth {
    fn name(&self) -> &str {
        "broker-connection"
    }

    fn is_healthy(&self) -> bool {
        self.consumer.is_connected()
    }
}

/// Shared state for axum handlers.
type AppState = Arc<Vec<Arc<dyn HealthCheck>>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    checks_run: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failed: Vec<String>,
}

/// Start the health server.
pub async fn serve(
    checks: Vec<Arc<dyn HealthCheck>>,
    config: &HealthConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = router(checks);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();
    info!(port = actual_port, "Health endpoint listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(checks: Vec<Arc<dyn HealthCheck>>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(Arc::new(checks))
}

async fn health(State(checks): State<AppState>) -> Response {
    let failed: Vec<String> = checks
        .iter()
        .filter(|check| !check.is_healthy())
        .map(|check| check.name().to_string())
        .collect();

    let status = if failed.is_empty() {
        StatusCode::OK
    } else {
        warn!(failed = ?failed, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = HealthResponse {
        checks_run: checks.len(),
        failed,
    };
    (status, Json(body)).into_response()
}
