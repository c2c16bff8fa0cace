//! Engine configuration.
//!
//! Loaded from a TOML file whose every field has a default, then patched with
//! environment overrides. A missing file yields the default configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::PersistenceConfig;
use crate::discovery::DiscoveryConfig;
use crate::logging::LogSettings;
use crate::prober::ProberConfig;
use crate::recovery::RecoveryPolicy;
use crate::resolver::ResolverConfig;
use crate::scheduler::SchedulerConfig;
use crate::utils::fs::io_error;
use crate::{Error, Result};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "livewatch.toml";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "LIVEWATCH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub recovery: RecoveryPolicy,
    pub prober: ProberConfig,
    pub resolver: ResolverConfig,
    pub discovery: DiscoveryConfig,
    pub persistence: PersistenceConfig,
    pub logging: LogSettings,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid config: {e}")))
    }

    /// Load `path`, or the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                info!(path = %path.display(), "Loaded configuration");
                Self::from_toml_str(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(io_error("reading config", path, e)),
        }
    }

    /// Resolve the config path: explicit flag, then `LIVEWATCH_CONFIG`, then
    /// `livewatch.toml`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply `YTDLP_PATH`, `FFMPEG_PATH` and `LIVEWATCH_CATALOG`.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = lookup("YTDLP_PATH") {
            self.resolver.ytdlp_path = path;
        }
        if let Some(path) = lookup("FFMPEG_PATH") {
            self.prober.ffmpeg_path = path;
        }
        if let Some(path) = lookup("LIVEWATCH_CATALOG") {
            self.persistence.catalog_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate()?;
        self.recovery.validate()?;
        self.prober.validate()?;
        self.resolver.validate()?;
        self.discovery.validate()?;
        self.persistence.validate()?;
        Ok(())
    }
}
