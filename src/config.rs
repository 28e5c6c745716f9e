//! Operator configuration.
//!
//! One JSON file holds the settings that are stable across regions: which
//! container runtime and image to use, where extracts come from, and how the
//! health probe asks for a route. Per-invocation choices (region, port,
//! profile) stay on the command line.
use crate::layout::Region;
use crate::server::health::{Coordinate, HealthTarget};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;
pub const CONFIG_ENV_VAR: &str = "OSRMCTL_CONFIG";

const CONFIG_DIR_NAME: &str = "osrmctl";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OsrmConfig {
    pub schema_version: u32,
    /// Container CLI, split like a shell word list (e.g. `"sudo docker"`).
    pub runtime_command: String,
    pub image: String,
    pub container_prefix: String,
    pub mirror_base_url: String,
    pub download_timeout_secs: u64,
    pub health: HealthConfig,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            runtime_command: "docker".to_string(),
            image: "osrm/osrm-backend".to_string(),
            container_prefix: "antar-osrm".to_string(),
            mirror_base_url: "https://download.geofabrik.de/asia".to_string(),
            download_timeout_secs: 3600,
            health: HealthConfig::default(),
        }
    }
}

impl OsrmConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Synthetic route request used by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    pub host: String,
    /// URL profile segment; `osrm-routed` accepts any value here.
    pub profile: String,
    pub from: Coordinate,
    pub to: Coordinate,
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        // Two points in Kuala Lumpur, inside the default region.
        Self {
            host: "localhost".to_string(),
            profile: "driving".to_string(),
            from: Coordinate {
                lon: 101.62917,
                lat: 3.10782,
            },
            to: Coordinate {
                lon: 101.61640,
                lat: 3.14685,
            },
            timeout_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn target(&self) -> HealthTarget {
        HealthTarget {
            host: self.host.clone(),
            profile: self.profile.clone(),
            from: self.from,
            to: self.to,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where the effective config came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ConfigSource {
    Flag(PathBuf),
    Env(PathBuf),
    UserConfigDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Flag(path)
            | ConfigSource::Env(path)
            | ConfigSource::UserConfigDir(path) => Some(path),
            ConfigSource::Defaults => None,
        }
    }
}

/// Pick the config file: flag, then env var, then the user config dir when
/// a file exists there.
pub fn resolve_config_path(
    flag: Option<&Path>,
    env_value: Option<PathBuf>,
    user_config_dir: Option<PathBuf>,
) -> ConfigSource {
    if let Some(path) = flag {
        return ConfigSource::Flag(path.to_path_buf());
    }
    if let Some(path) = env_value.filter(|path| !path.as_os_str().is_empty()) {
        return ConfigSource::Env(path);
    }
    if let Some(path) = user_config_dir
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
    {
        return ConfigSource::UserConfigDir(path);
    }
    ConfigSource::Defaults
}

/// Default location written by `config --init` when nothing else is chosen.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn load_config(path: &Path) -> Result<OsrmConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: OsrmConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Persist a config to disk in a stable JSON format.
pub fn write_config(path: &Path, config: &OsrmConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }
    let mut text = serde_json::to_string_pretty(config).context("serialize config")?;
    text.push('\n');
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn validate_config(config: &OsrmConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    let runtime = shell_words::split(&config.runtime_command)
        .with_context(|| format!("parse runtime_command {:?}", config.runtime_command))?;
    if runtime.is_empty() {
        return Err(anyhow!("runtime_command must be non-empty"));
    }
    if config.image.trim().is_empty() {
        return Err(anyhow!("image must be non-empty"));
    }
    // The prefix becomes part of every container name.
    Region::parse(&config.container_prefix)
        .map_err(|_| anyhow!("container_prefix {:?} is not a valid name part", config.container_prefix))?;
    let url = config.mirror_base_url.as_str();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(anyhow!(
            "mirror_base_url must be an http(s) URL (got {url:?})"
        ));
    }
    if config.download_timeout_secs == 0 {
        return Err(anyhow!("download_timeout_secs must be positive"));
    }
    validate_health(&config.health)
}

fn validate_health(health: &HealthConfig) -> Result<()> {
    if health.host.trim().is_empty() {
        return Err(anyhow!("health.host must be non-empty"));
    }
    if health.profile.trim().is_empty() || health.profile.contains('/') {
        return Err(anyhow!(
            "health.profile must be a single URL segment (got {:?})",
            health.profile
        ));
    }
    if health.timeout_secs == 0 {
        return Err(anyhow!("health.timeout_secs must be positive"));
    }
    for (label, coordinate) in [("health.from", health.from), ("health.to", health.to)] {
        if !(-180.0..=180.0).contains(&coordinate.lon) || !(-90.0..=90.0).contains(&coordinate.lat)
        {
            return Err(anyhow!(
                "{label} is out of range (lon {}, lat {})",
                coordinate.lon,
                coordinate.lat
            ));
        }
    }
    Ok(())
}

/// Resolve, load and validate the config for this invocation.
pub fn load_effective_config(flag: Option<&Path>) -> Result<(OsrmConfig, ConfigSource)> {
    let source = resolve_config_path(
        flag,
        std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from),
        dirs::config_dir(),
    );
    let config = match source.path() {
        Some(path) => load_config(path)?,
        None => OsrmConfig::default(),
    };
    validate_config(&config).with_context(|| match source.path() {
        Some(path) => format!("invalid config {}", path.display()),
        None => "invalid default config".to_string(),
    })?;
    tracing::debug!(source = ?source, "config loaded");
    Ok((config, source))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
