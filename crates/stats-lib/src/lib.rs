//! Edge and ESXi datapath statistics pipeline
//!
//! This crate provides the core functionality for:
//! - Collecting raw stats from NSX edge nodes and ESXi hosts over SSH
//! - Normalizing them into typed per-host models
//! - Merging them over default templates and computing fleet aggregates
//! - Flattening them into `|`-delimited metric records
//! - Publishing the records to vRealize Operations

pub mod aggregate;
pub mod collector;
pub mod error;
pub mod extract;
pub mod flatten;
pub mod health;
pub mod merge;
pub mod models;
pub mod observability;
pub mod parse;
pub mod pipeline;
pub mod settings;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, StatsError};
pub use flatten::MetricFlattener;
pub use health::{
    ComponentHealth, ComponentStatus, CycleSummary, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{BatchAssembler, CycleReport, PipelineError, StatsPipeline};
pub use settings::{Credentials, Settings};
