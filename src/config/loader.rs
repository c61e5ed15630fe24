use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

use super::types::DaemonConfig;

/// File name looked up by [`DaemonConfig::load`].
pub const CONFIG_FILE: &str = ".e2e-docker.yaml";

impl DaemonConfig {
    /// Load config from a `.e2e-docker.yaml` file in the given directory.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_file(&path).map(Some)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `E2E_DOCKER_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(exec) = lookup("E2E_DOCKER_EXEC") {
            self.docker_exec = exec;
        }
        if let Some(socket) = lookup("E2E_DOCKER_SOCKET") {
            self.socket = socket;
        }
        if let Some(base) = lookup("E2E_DOCKER_BASE_DIR") {
            self.base_dir = base.into();
        }
        if let Some(manage) = lookup("E2E_DOCKER_MANAGE") {
            match parse_flag(&manage) {
                Some(flag) => self.manage_daemon = flag,
                None => warn!(
                    value = %manage,
                    keep = self.manage_daemon,
                    "ignoring unrecognised E2E_DOCKER_MANAGE"
                ),
            }
        }
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}
