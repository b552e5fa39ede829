//! Sensor host configuration.
//!
//! [`HostConfig`] mirrors the attribute map the host framework hands us and can
//! be loaded from a TOML file. It is turned into a [`ValidatedConfig`] before
//! any resource is touched.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw configuration as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Ordered list of source names to poll
    #[serde(default)]
    pub sensors: Vec<String>,
    /// Port for the publish server
    pub port: i64,
    /// Refresh interval in seconds
    #[serde(default)]
    pub refresh: Option<f64>,
    /// Directory under which generation directories are created
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    /// Whether to add permissive CORS headers to responses
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

fn default_enable_cors() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sensors: Vec::new(),
            port: i64::from(crate::DEFAULT_PORT),
            refresh: None,
            base_dir: None,
            enable_cors: true,
        }
    }
}

impl HostConfig {
    /// Create a configuration for the given sources and port.
    pub fn new<I, S>(sensors: I, port: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sensors: sensors.into_iter().map(Into::into).collect(),
            port,
            ..Default::default()
        }
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::config_error(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HostError::config_error(format!("Invalid TOML configuration: {}", e)))
    }

    /// Set the refresh interval in seconds.
    pub fn with_refresh(mut self, seconds: f64) -> Self {
        self.refresh = Some(seconds);
        self
    }

    /// Set the base directory for generation directories.
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    /// Check the configuration and substitute defaults.
    pub fn validate(&self) -> Result<ValidatedConfig> {
        if self.sensors.is_empty() {
            return Err(HostError::config_error(
                "At least one sensor must be specified",
            ));
        }

        let mut seen = HashSet::new();
        for name in &self.sensors {
            validate_source_name(name)?;
            if !seen.insert(name.as_str()) {
                return Err(HostError::config_error(format!(
                    "Sensor '{}' is listed more than once",
                    name
                )));
            }
        }

        let port = u16::try_from(self.port)
            .ok()
            .filter(|port| *port != 0)
            .ok_or_else(|| HostError::config_error("Port must be between 1 and 65535"))?;

        let refresh_interval = self
            .refresh
            .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
            .filter(|interval| !interval.is_zero())
            .unwrap_or(crate::DEFAULT_REFRESH_INTERVAL);

        Ok(ValidatedConfig {
            sensors: self.sensors.clone(),
            port,
            refresh_interval,
            base_dir: self.base_dir.clone().unwrap_or_else(default_base_dir),
            enable_cors: self.enable_cors,
        })
    }
}

/// A configuration that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    pub sensors: Vec<String>,
    pub port: u16,
    pub refresh_interval: Duration,
    pub base_dir: PathBuf,
    pub enable_cors: bool,
}

/// Source names become directory names, so they must be one plain path segment.
fn validate_source_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(HostError::config_error(format!(
            "Invalid sensor name '{}'",
            name
        )));
    }
    Ok(())
}

/// Prefer the RAM-backed `/dev/shm` when present.
pub fn default_base_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}
