// Controller configuration: defaults, YAML file and environment overrides.

mod loader;
mod types;

pub use loader::CONFIG_FILE;
pub use types::{DaemonConfig, Privilege, ReadinessConfig};

/// Config for `dir`: the YAML file if present, defaults otherwise, with
/// environment overrides applied on top.
pub fn load(dir: &std::path::Path) -> anyhow::Result<DaemonConfig> {
    Ok(DaemonConfig::load(dir)?
        .unwrap_or_default()
        .with_env_overrides())
}
