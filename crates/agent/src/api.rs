//! HTTP API for the daemon mode
//!
//! - `/healthz`: collector and publisher health plus the last cycle summary
//! - `/readyz`: ready once a cycle ran and nothing is unhealthy
//! - `/cycle`: resources, records and fallback hosts of the last published cycle
//! - `/metrics`: pipeline counters in Prometheus text format

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use stats_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::PipelineMetrics,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: PipelineMetrics) -> Self {
        Self {
            health_registry,
            metrics,
        }
    }
}

/// Hosts falling back to templates degrade the pipeline but keep it serving
fn health_code(status: ComponentStatus) -> StatusCode {
    if status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let health = state.health_registry.health().await;
    (health_code(health.status), Json(health)).into_response()
}

async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    let readiness = state.health_registry.readiness().await;
    let code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(readiness)).into_response()
}

async fn last_cycle(State(state): State<Arc<AppState>>) -> Response {
    match state.health_registry.last_cycle().await {
        Some(summary) => Json(summary).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"message": "No cycle has published metrics yet"})),
        )
            .into_response(),
    }
}

async fn metrics() -> Response {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/cycle", get(last_cycle))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}
