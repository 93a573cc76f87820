//! Scripted collaborators for collector and pipeline tests

use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use crate::collector::{async_trait, CommandExecutor, SessionId, SessionProvider, Target};
use crate::error::{Result, StatsError};
use crate::sync::{ErrorNotifier, MetricPublisher, ResourceMetrics, ResourceResolver, SyncError};
use crate::sync::{EDGE_CLUSTER, TRANSPORT_NODE};

/// Remote shell answering commands from a script
#[derive(Default)]
pub(crate) struct FakeShell {
    payloads: HashMap<(String, String), Value>,
    unreachable: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeShell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_payload(mut self, host_id: &str, command: &str, payload: Value) -> Self {
        self.payloads
            .insert((host_id.to_string(), command.to_string()), payload);
        self
    }

    pub(crate) fn unreachable(mut self, host_id: &str) -> Self {
        self.unreachable.insert(host_id.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn host_of(session: &SessionId) -> &str {
    session
        .as_str()
        .split_once(':')
        .map(|(_, id)| id)
        .unwrap_or_default()
}

#[async_trait]
impl SessionProvider for FakeShell {
    async fn connect(&self, target: &Target) -> Result<SessionId> {
        self.record(format!("connect:{}", target.id));
        if self.unreachable.contains(&target.id) {
            return Err(StatsError::Connect {
                target: target.id.clone(),
                address: target.address.clone(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(SessionId::for_target(target))
    }

    async fn disconnect(&self, session: &SessionId) {
        self.record(format!("disconnect:{}", host_of(session)));
    }

    async fn disconnect_all(&self) {
        self.record("disconnect_all".to_string());
    }
}

#[async_trait]
impl CommandExecutor for FakeShell {
    async fn execute(&self, session: &SessionId, command: &str) -> Value {
        let host = host_of(session);
        self.record(format!("exec:{host}:{command}"));
        self.payloads
            .get(&(host.to_string(), command.to_string()))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }
}

/// Monitoring backend recording everything it is sent
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) nodes: BTreeMap<String, String>,
    pub(crate) clusters: BTreeMap<String, String>,
    pub(crate) reject_publish: bool,
    pub(crate) published: Mutex<Vec<Vec<ResourceMetrics>>>,
    pub(crate) notifications: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn new(nodes: &[(&str, &str)], clusters: &[(&str, &str)]) -> Self {
        let map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            nodes: map(nodes),
            clusters: map(clusters),
            ..Self::default()
        }
    }
}

#[async_trait]
impl ResourceResolver for FakeBackend {
    async fn resource_map(
        &self,
        _adapter_kind: &str,
        resource_kind: &str,
    ) -> std::result::Result<BTreeMap<String, String>, SyncError> {
        Ok(match resource_kind {
            TRANSPORT_NODE => self.nodes.clone(),
            EDGE_CLUSTER => self.clusters.clone(),
            _ => BTreeMap::new(),
        })
    }
}

#[async_trait]
impl MetricPublisher for FakeBackend {
    async fn publish(&self, batch: &[ResourceMetrics]) -> std::result::Result<(), SyncError> {
        if self.reject_publish {
            return Err(SyncError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        self.published.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

#[async_trait]
impl ErrorNotifier for FakeBackend {
    async fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }
}
