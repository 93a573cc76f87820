//! SSH transport using the system OpenSSH client
//!
//! `connect` starts a control master per host; commands then reuse its
//! socket so authentication happens once per host. Password logins go
//! through `sshpass -e`, key-based logins run in batch mode.

use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{async_trait, CommandExecutor, HostKind, SessionId, SessionProvider, Target};
use crate::error::{Result, StatsError};
use crate::settings::{Credential, CredentialSet, Credentials};

/// Extra time granted to the ssh process on top of `ConnectTimeout`
const CONNECT_GRACE: Duration = Duration::from_secs(5);

static TIMESTAMP_BANNER: OnceLock<Regex> = OnceLock::new();

/// True when stderr only carries the NSX CLI timestamp banner,
/// e.g. `Thu Jan 09 2025 UTC 15:19:08.539`
pub fn is_timestamp_only(stderr: &str) -> bool {
    let pattern = TIMESTAMP_BANNER.get_or_init(|| {
        Regex::new(r"^[A-Za-z]{3}\s+[A-Za-z]{3}\s+\d{2}\s+\d{4}\s+UTC\s+\d{2}:\d{2}:\d{2}\.\d{3}$")
            .expect("valid regex")
    });
    pattern.is_match(stderr.trim())
}

#[derive(Debug, Clone)]
struct SshSession {
    target_id: String,
    destination: String,
    control_path: PathBuf,
}

/// [`SessionProvider`] and [`CommandExecutor`] over OpenSSH control masters
pub struct SshTransport {
    edge_credentials: CredentialSet,
    esxi_credentials: CredentialSet,
    connect_timeout: Duration,
    control_dir: PathBuf,
    sessions: Mutex<HashMap<SessionId, SshSession>>,
}

impl SshTransport {
    pub fn new(credentials: &Credentials, connect_timeout: Duration) -> Self {
        Self {
            edge_credentials: credentials.edge_nodes.clone(),
            esxi_credentials: credentials.esxi_hosts.clone(),
            connect_timeout,
            control_dir: std::env::temp_dir().join("edgestats-ssh"),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn credential_for(&self, target: &Target) -> &Credential {
        match target.kind {
            HostKind::Esxi => self.esxi_credentials.resolve(&target.id),
            HostKind::EdgeNode => self.edge_credentials.resolve(&target.id),
        }
    }

    /// Socket per target; the id digest keeps sanitized names apart
    fn control_path(&self, target: &Target) -> PathBuf {
        let safe_id: String = target
            .id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        let digest = format!("{:x}", Sha256::digest(target.id.as_bytes()));
        self.control_dir.join(format!(
            "{}-{}-{}.sock",
            target.kind.label(),
            safe_id,
            &digest[..8]
        ))
    }

    fn connect_command(&self, credential: &Credential, session: &SshSession) -> Command {
        let mut cmd = match &credential.password {
            Some(password) => {
                let mut cmd = Command::new("sshpass");
                cmd.arg("-e").arg("ssh").env("SSHPASS", password);
                cmd
            }
            None => {
                let mut cmd = Command::new("ssh");
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };

        cmd.args(["-M", "-N", "-f"])
            .arg("-o")
            .arg(format!("ControlPath={}", session.control_path.display()))
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout.as_secs()))
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"])
            .arg(&session.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    fn session_command(session: &SshSession) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg(format!("ControlPath={}", session.control_path.display()))
            .args(["-o", "LogLevel=ERROR"]);
        cmd
    }

    async fn close(&self, session: &SshSession) {
        let result = Self::session_command(session)
            .args(["-O", "exit"])
            .arg(&session.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(_) => debug!(target_id = %session.target_id, "Closed connection"),
            Err(e) => debug!(target_id = %session.target_id, error = %e, "Failed to close connection"),
        }
    }
}

#[async_trait]
impl SessionProvider for SshTransport {
    async fn connect(&self, target: &Target) -> Result<SessionId> {
        let id = SessionId::for_target(target);
        let credential = self.credential_for(target);
        let session = SshSession {
            target_id: target.id.clone(),
            destination: format!("{}@{}", credential.username, target.address),
            control_path: self.control_path(target),
        };

        let connect_error = |reason: String| StatsError::Connect {
            target: target.id.clone(),
            address: target.address.clone(),
            reason,
        };

        tokio::fs::create_dir_all(&self.control_dir)
            .await
            .map_err(|e| connect_error(format!("cannot create control directory: {e}")))?;

        let mut cmd = self.connect_command(credential, &session);
        let status = tokio::time::timeout(self.connect_timeout + CONNECT_GRACE, cmd.status())
            .await
            .map_err(|_| connect_error("timed out".to_string()))?
            .map_err(|e| connect_error(e.to_string()))?;

        if !status.success() {
            return Err(connect_error(format!("ssh exited with {status}")));
        }

        debug!(target_id = %target.id, address = %target.address, "Connected");
        self.sessions.lock().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn disconnect(&self, session: &SessionId) {
        let removed = self.sessions.lock().await.remove(session);
        if let Some(session) = removed {
            self.close(&session).await;
        }
    }

    async fn disconnect_all(&self) {
        let sessions: Vec<SshSession> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        for session in &sessions {
            self.close(session).await;
        }
    }
}

#[async_trait]
impl CommandExecutor for SshTransport {
    async fn execute(&self, session: &SessionId, command: &str) -> Value {
        let empty = Value::Object(Default::default());
        let Some(ssh) = self.sessions.lock().await.get(session).cloned() else {
            warn!(
                error = %StatsError::NotConnected { target: session.to_string() },
                command = %command,
                "Cannot execute command"
            );
            return empty;
        };

        let output = Self::session_command(&ssh)
            .arg(&ssh.destination)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                warn!(target_id = %ssh.target_id, command = %command, error = %e, "Command failed to run");
                return empty;
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() && !is_timestamp_only(&stderr) {
            warn!(target_id = %ssh.target_id, command = %command, stderr = %stderr.trim(), "Command produced error output");
        }

        match serde_json::from_slice(&output.stdout) {
            Ok(value) => value,
            Err(e) => {
                warn!(target_id = %ssh.target_id, command = %command, error = %e, "Command output is not JSON");
                empty
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        let cred = |user: &str| Credential {
            username: user.to_string(),
            password: None,
        };
        Credentials {
            edge_nodes: CredentialSet {
                default: cred("admin"),
                overrides: [("edge-2".to_string(), cred("audit"))].into_iter().collect(),
            },
            esxi_hosts: CredentialSet {
                default: cred("root"),
                overrides: Default::default(),
            },
            vrops_instance: cred("svc"),
        }
    }

    #[test]
    fn test_timestamp_banner_detection() {
        assert!(is_timestamp_only("Thu Jan 09 2025 UTC 15:19:08.539"));
        assert!(is_timestamp_only("Mon Dec 30 2024 UTC 01:02:03.004\n"));
        assert!(!is_timestamp_only("% Command not found: get foo"));
        assert!(!is_timestamp_only(
            "Thu Jan 09 2025 UTC 15:19:08.539\nPermission denied"
        ));
    }

    #[test]
    fn test_credentials_by_host_kind() {
        let transport = SshTransport::new(&credentials(), Duration::from_secs(10));

        assert_eq!(transport.credential_for(&Target::edge("edge-1", "h")).username, "admin");
        assert_eq!(transport.credential_for(&Target::edge("edge-2", "h")).username, "audit");
        assert_eq!(transport.credential_for(&Target::esxi("edge-2", "h")).username, "root");
    }

    #[test]
    fn test_control_path_is_sanitized() {
        let transport = SshTransport {
            control_dir: PathBuf::from("/tmp/es"),
            ..SshTransport::new(&credentials(), Duration::from_secs(10))
        };
        let path = transport.control_path(&Target::esxi("esx 01/a", "10.0.0.1"));
        let name = path.file_name().unwrap().to_str().unwrap();

        assert_eq!(path.parent(), Some(std::path::Path::new("/tmp/es")));
        assert!(name.starts_with("esxi-esx_01_a-"));
        assert!(name.ends_with(".sock"));
        assert_eq!(name.len(), "esxi-esx_01_a-".len() + 8 + ".sock".len());
    }

    #[test]
    fn test_control_paths_differ_for_colliding_ids() {
        let transport = SshTransport::new(&credentials(), Duration::from_secs(10));

        let dotted = transport.control_path(&Target::edge("a.b", "10.0.0.1"));
        let underscored = transport.control_path(&Target::edge("a_b", "10.0.0.2"));
        assert_ne!(dotted, underscored);

        let again = transport.control_path(&Target::edge("a.b", "10.0.0.1"));
        assert_eq!(dotted, again);
    }

    #[tokio::test]
    async fn test_execute_without_session_returns_empty_object() {
        let transport = SshTransport::new(&credentials(), Duration::from_secs(10));
        let session = SessionId::for_target(&Target::edge("edge-1", "10.0.0.1"));

        let payload = transport.execute(&session, "get interfaces | json").await;
        assert_eq!(payload, serde_json::json!({}));
    }
}
