//! Remote statistics collection
//!
//! Collectors walk the configured topology one host at a time. A host that
//! cannot be reached or returns nothing is replaced by its fallback record
//! and collection carries on with the next one.

mod edge;
mod esxi;
mod ssh;

#[cfg(test)]
mod tests;

pub use edge::EdgeCollector;
pub use esxi::EsxiCollector;
pub use ssh::{is_timestamp_only, SshTransport};

use serde_json::Value;
use std::fmt;

use crate::error::Result;

pub use async_trait::async_trait;

/// `get interfaces | json` on an edge node
pub const EDGE_INTERFACES_COMMAND: &str = "get interfaces | json";

/// Per-thread scheduler stats on an ESXi host
pub fn net_stats_command(interval_secs: u64) -> String {
    format!("net-stats -i {interval_secs} -tW -A")
}

/// Dataplane CPU and flow-cache stats on an edge node
pub fn perfstats_command(interval_secs: u64) -> String {
    format!("get dataplane perfstats {interval_secs}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostKind {
    Esxi,
    EdgeNode,
}

impl HostKind {
    pub fn label(self) -> &'static str {
        match self {
            HostKind::Esxi => "esxi",
            HostKind::EdgeNode => "edge",
        }
    }
}

/// A host to collect from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub id: String,
    pub address: String,
    pub kind: HostKind,
}

impl Target {
    pub fn esxi(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            kind: HostKind::Esxi,
        }
    }

    pub fn edge(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            kind: HostKind::EdgeNode,
        }
    }
}

/// Handle of an open remote session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn for_target(target: &Target) -> Self {
        Self(format!("{}:{}", target.kind.label(), target.id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opens and closes remote sessions. Credential lookup happens here.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn connect(&self, target: &Target) -> Result<SessionId>;

    async fn disconnect(&self, session: &SessionId);

    async fn disconnect_all(&self);
}

/// Runs CLI commands on an open session
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Parsed JSON output, or an empty object on any failure
    async fn execute(&self, session: &SessionId, command: &str) -> Value;
}

/// A transport providing both sessions and command execution
pub trait RemoteShell: SessionProvider + CommandExecutor {}

impl<T: SessionProvider + CommandExecutor> RemoteShell for T {}

/// True when a command produced nothing usable
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(list) => list.is_empty(),
        _ => false,
    }
}

/// Collected statistics plus the hosts that fell back to their template
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection<T> {
    pub stats: T,
    pub fallbacks: Vec<String>,
}
