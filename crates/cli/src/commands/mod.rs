//! Subcommand implementations

pub mod collect;
pub mod metrics;

use anyhow::Result;
use stats_lib::collector::{RemoteShell, SshTransport};
use stats_lib::settings::{Credentials, Settings};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Settings plus the credentials file for commands that reach hosts
pub struct Context {
    pub settings: Settings,
    credentials: PathBuf,
}

impl Context {
    pub fn load(config: &Path, credentials: &Path) -> Result<Self> {
        let settings = Settings::load(config)?;
        debug!(
            config = %config.display(),
            edge_nodes = settings.edge_nodes.len(),
            clusters = settings.edge_clusters.len(),
            "Loaded settings"
        );
        Ok(Self {
            settings,
            credentials: credentials.to_path_buf(),
        })
    }

    /// SSH transport using the configured credentials
    pub fn shell(&self) -> Result<Arc<dyn RemoteShell>> {
        let credentials = Credentials::load(&self.credentials)?;
        Ok(Arc::new(SshTransport::new(
            &credentials,
            self.settings.collection.connect_timeout(),
        )))
    }

    /// Requested cluster, else the configured default
    pub fn cluster(&self, requested: Option<String>) -> Option<String> {
        requested.or_else(|| self.settings.selected_cluster().map(str::to_string))
    }
}
