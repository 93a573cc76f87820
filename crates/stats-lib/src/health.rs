//! Health tracking for the daemon mode
//!
//! Each pipeline stage reports its outcome after every cycle, and a
//! successful cycle leaves its summary behind. The agent serves both on
//! `/healthz`, `/readyz` and `/cycle`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some hosts fell back to their template
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with(ComponentStatus::Unhealthy, Some(message.into()))
    }

    /// Health of a collector given how many of its hosts fell back
    pub fn from_collection(total: usize, fallbacks: usize) -> Self {
        match (total, fallbacks) {
            (0, _) => Self::degraded("no hosts configured"),
            (_, 0) => Self::healthy(),
            (t, f) if f >= t => Self::unhealthy(format!("all {t} hosts unreachable")),
            (t, f) => Self::degraded(format!("{f} of {t} hosts using fallback stats")),
        }
    }
}

/// What the last successful cycle published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleSummary {
    /// Epoch milliseconds stamped on the published records
    pub timestamp: i64,
    pub resources: usize,
    pub records: usize,
    /// Hosts and edge nodes reported with template stats
    pub fallback_hosts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleSummary>,
}

impl HealthResponse {
    /// Worst status among the components
    pub fn compute_status(components: &BTreeMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const EDGE_COLLECTOR: &str = "edge_collector";
    pub const ESXI_COLLECTOR: &str = "esxi_collector";
    pub const PUBLISHER: &str = "publisher";

    pub const ALL: [&str; 3] = [EDGE_COLLECTOR, ESXI_COLLECTOR, PUBLISHER];
}

/// Shared registry of component health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<BTreeMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    last_cycle: Arc<RwLock<Option<CycleSummary>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every pipeline component registered as healthy
    pub async fn for_pipeline() -> Self {
        let registry = Self::new();
        for name in components::ALL {
            registry.register(name).await;
        }
        registry
    }

    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    /// Readiness flips once the first cycle has finished
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn record_cycle(&self, summary: CycleSummary) {
        *self.last_cycle.write().await = Some(summary);
    }

    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.read().await.clone()
    }

    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse {
            status,
            components,
            last_cycle: self.last_cycle().await,
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("No collection cycle completed yet")
        } else if !health.status.is_operational() {
            Some("Pipeline component unhealthy")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}
