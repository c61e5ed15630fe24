use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How commands that need root are run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// `sudo` unless already running as root.
    #[default]
    Auto,
    Sudo,
    None,
}

/// Exponential backoff for the daemon readiness probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub timeout_secs: u64,
}

impl ReadinessConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 50,
            max_delay_ms: 2000,
            multiplier: 2.0,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// The `docker` executable used for every CLI call.
    pub docker_exec: String,
    /// Start and stop a private daemon instead of using the host's.
    pub manage_daemon: bool,
    pub base_dir: PathBuf,
    pub cidr: String,
    pub bridge: String,
    /// Endpoint passed as `-H`. Replaced by [`Self::managed_socket`] when a
    /// managed daemon starts.
    pub socket: String,
    pub privilege: Privilege,
    /// Seconds any single CLI call may take before it is killed.
    pub command_timeout: u64,
    pub readiness: ReadinessConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            docker_exec: "docker".to_string(),
            manage_daemon: false,
            base_dir: PathBuf::from("/"),
            cidr: "10.123.0.0/24".to_string(),
            bridge: "docker0".to_string(),
            socket: "unix:///var/run/docker.sock".to_string(),
            privilege: Privilege::Auto,
            command_timeout: 600,
            readiness: ReadinessConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// The daemon already running on this host.
    pub fn host_default() -> Self {
        Self::default()
    }

    /// A private daemon rooted at `base_dir`.
    pub fn managed(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            manage_daemon: true,
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout)
    }

    pub fn exec_root(&self) -> PathBuf {
        self.base_path("var/run/docker")
    }

    pub fn graph_root(&self) -> PathBuf {
        self.base_path("var/lib/docker")
    }

    pub fn pidfile(&self) -> PathBuf {
        self.base_path("pid")
    }

    pub fn managed_socket(&self) -> String {
        format!("unix://{}", self.base_path("var/run/docker.sock").display())
    }

    fn base_path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.base_dir.join(rel)
    }
}
