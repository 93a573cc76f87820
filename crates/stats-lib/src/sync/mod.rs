//! Synchronization with the monitoring backend
//!
//! This module provides:
//! - The collaborator traits the pipeline publishes through
//! - A vRealize Operations REST client implementing them
//! - The bulk stats wire format

mod client;


pub use client::{ClientConfig, VropsClient};

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::collector::async_trait;
use crate::models::MetricRecord;

/// Adapter kind of the NSX-T management pack
pub const NSXT_ADAPTER: &str = "NSXTAdapter";
/// Resource kind of an edge transport node
pub const TRANSPORT_NODE: &str = "TransportNode";
/// Resource kind of an edge cluster
pub const EDGE_CLUSTER: &str = "EdgeCluster";

/// Errors talking to the monitoring backend
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("no access token; login first")]
    Unauthenticated,

    #[error("invalid backend URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Metric records addressed to one backend resource
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceMetrics {
    pub resource_id: String,
    pub records: Vec<MetricRecord>,
}

/// Maps fleet identifiers to backend resource identifiers
#[async_trait]
pub trait ResourceResolver: Send + Sync {
    /// Fleet id to backend resource id for one adapter/resource kind
    async fn resource_map(
        &self,
        adapter_kind: &str,
        resource_kind: &str,
    ) -> Result<BTreeMap<String, String>, SyncError>;
}

/// Publishes flattened metrics; a single attempt per call
#[async_trait]
pub trait MetricPublisher: Send + Sync {
    async fn publish(&self, batch: &[ResourceMetrics]) -> Result<(), SyncError>;
}

/// Best-effort failure notification; errors are logged and dropped
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn notify(&self, message: &str);
}

/// Everything the pipeline needs from the backend
pub trait MonitoringBackend: ResourceResolver + MetricPublisher + ErrorNotifier {}

impl<T: ResourceResolver + MetricPublisher + ErrorNotifier> MonitoringBackend for T {}

#[derive(Debug, Serialize)]
struct StatContent<'a> {
    #[serde(rename = "statKey")]
    stat_key: &'a str,
    timestamps: [i64; 1],
    data: [f64; 1],
}

#[derive(Debug, Serialize)]
struct ResourceStatContent<'a> {
    id: &'a str,
    #[serde(rename = "stat-contents")]
    stat_contents: Vec<StatContent<'a>>,
}

/// Bulk stats body for `POST /suite-api/api/resources/stats`
#[derive(Debug, Serialize)]
struct StatsPayload<'a> {
    #[serde(rename = "resource-stat-content")]
    resource_stat_content: Vec<ResourceStatContent<'a>>,
}

impl<'a> StatsPayload<'a> {
    fn new(batch: &'a [ResourceMetrics]) -> Self {
        Self {
            resource_stat_content: batch
                .iter()
                .map(|resource| ResourceStatContent {
                    id: &resource.resource_id,
                    stat_contents: resource
                        .records
                        .iter()
                        .map(|record| StatContent {
                            stat_key: &record.key,
                            timestamps: [record.timestamp],
                            data: [record.value],
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}
