//! Configuration and credentials
//!
//! Topology and backend settings come from `config.yaml`, secrets from
//! `credentials.yaml`. Both files are read as plain YAML so host and cluster
//! ids keep their case. Environment variables prefixed `EDGESTATS__` override
//! the scalar `collection` and `vrops_instance` settings, e.g.
//! `EDGESTATS__COLLECTION__CLUSTER=Cluster-B`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::flatten::DEFAULT_USAGE_ALERT_THRESHOLD;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "EDGESTATS";

/// Top-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Edge node id to management address
    #[serde(default)]
    pub edge_nodes: BTreeMap<String, String>,

    /// Edge cluster id to its ESXi hosts
    #[serde(default)]
    pub edge_clusters: BTreeMap<String, EdgeClusterConfig>,

    pub vrops_instance: VropsConfig,

    #[serde(default)]
    pub collection: CollectionConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EdgeClusterConfig {
    /// ESXi host id to management address
    #[serde(default)]
    pub esxi_hosts: BTreeMap<String, String>,
}

/// Monitoring backend location
#[derive(Debug, Clone, Deserialize)]
pub struct VropsConfig {
    pub ip: String,
    pub adapter_instance_id: String,

    /// Overrides the `https://{ip}` base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Appliances usually run with self-signed certificates
    #[serde(default)]
    pub verify_tls: bool,
}

impl VropsConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}", self.ip))
    }
}

/// Collection tuning
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Thread `used` percentage counted as overloaded
    #[serde(default = "default_usage_alert_threshold")]
    pub usage_alert_threshold: f64,

    /// Sampling interval passed to `net-stats` and `perfstats`
    #[serde(default = "default_perfstats_interval")]
    pub perfstats_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Edge cluster to collect; defaults to the first configured one
    #[serde(default)]
    pub cluster: Option<String>,
}

fn default_usage_alert_threshold() -> f64 {
    DEFAULT_USAGE_ALERT_THRESHOLD
}

fn default_perfstats_interval() -> u64 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            usage_alert_threshold: default_usage_alert_threshold(),
            perfstats_interval_secs: default_perfstats_interval(),
            connect_timeout_secs: default_connect_timeout(),
            cluster: None,
        }
    }
}

impl CollectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Scalar settings that may be overridden from the environment.
///
/// Map-valued settings are keyed by fleet ids and only come from the file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsOverrides {
    #[serde(default)]
    pub collection: CollectionOverrides,
    #[serde(default)]
    pub vrops_instance: VropsOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionOverrides {
    pub usage_alert_threshold: Option<f64>,
    pub perfstats_interval_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub cluster: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VropsOverrides {
    pub ip: Option<String>,
    pub adapter_instance_id: Option<String>,
    pub base_url: Option<String>,
    pub verify_tls: Option<bool>,
}

impl SettingsOverrides {
    /// Overrides from `EDGESTATS__*` variables
    pub fn from_env() -> Result<Self> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .context("invalid EDGESTATS__ environment override")
    }

    pub fn apply(self, settings: &mut Settings) {
        let collection = &mut settings.collection;
        if let Some(threshold) = self.collection.usage_alert_threshold {
            collection.usage_alert_threshold = threshold;
        }
        if let Some(interval) = self.collection.perfstats_interval_secs {
            collection.perfstats_interval_secs = interval;
        }
        if let Some(timeout) = self.collection.connect_timeout_secs {
            collection.connect_timeout_secs = timeout;
        }
        if let Some(cluster) = self.collection.cluster {
            collection.cluster = Some(cluster);
        }

        let vrops = &mut settings.vrops_instance;
        if let Some(ip) = self.vrops_instance.ip {
            vrops.ip = ip;
        }
        if let Some(id) = self.vrops_instance.adapter_instance_id {
            vrops.adapter_instance_id = id;
        }
        if let Some(url) = self.vrops_instance.base_url {
            vrops.base_url = Some(url);
        }
        if let Some(verify) = self.vrops_instance.verify_tls {
            vrops.verify_tls = verify;
        }
    }
}

/// Deserialize a YAML file, keeping mapping keys exactly as written
fn read_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {what} from {}", path.display()))?;
    serde_yaml::from_str(&data).with_context(|| format!("invalid {what} in {}", path.display()))
}

impl Settings {
    /// Load from a YAML file plus `EDGESTATS__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut settings: Settings = read_yaml(path.as_ref(), "configuration")?;
        SettingsOverrides::from_env()?.apply(&mut settings);
        Ok(settings)
    }

    /// Cluster to collect: the configured one, else the first by id
    pub fn selected_cluster(&self) -> Option<&str> {
        match &self.collection.cluster {
            Some(id) => Some(id.as_str()),
            None => self.edge_clusters.keys().next().map(String::as_str),
        }
    }
}

/// Login for a remote host or the backend
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Default login plus per-identifier overrides
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialSet {
    pub default: Credential,
    #[serde(default, alias = "nodes", alias = "hosts")]
    pub overrides: BTreeMap<String, Credential>,
}

impl CredentialSet {
    /// Override for `id`, else the default
    pub fn resolve(&self, id: &str) -> &Credential {
        self.overrides.get(id).unwrap_or(&self.default)
    }
}

/// Contents of `credentials.yaml`
#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub edge_nodes: CredentialSet,
    pub esxi_hosts: CredentialSet,
    pub vrops_instance: Credential,
}

impl Credentials {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_yaml(path.as_ref(), "credentials")
    }
}
