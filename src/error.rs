//! Error handling for the sensor host.

use std::net::SocketAddr;
use std::path::PathBuf;

/// A specialized `Result` type for sensor host operations.
pub type Result<T> = std::result::Result<T, HostError>;

/// The main error type for sensor host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Configuration was rejected before any resource was touched
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation directory could not be created
    #[error("Failed to initialize snapshot store at {path}: {source}")]
    StoreInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The publish server could not bind its listener
    #[error("Failed to bind publish server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A poller was started twice
    #[error("Poller is already running")]
    AlreadyRunning,

    /// A source failed to produce readings
    #[error("Failed to fetch readings from source '{source_name}': {source}")]
    Fetch {
        source_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// Writing or renaming a snapshot failed
    #[error("Failed to publish snapshot for source '{source_name}': {source}")]
    Publish {
        source_name: String,
        #[source]
        source: std::io::Error,
    },

    /// Readings could not be encoded as JSON
    #[error("Failed to serialize readings for source '{source_name}': {source}")]
    Serialize {
        source_name: String,
        #[source]
        source: serde_json::Error,
    },

    /// Removing a generation directory failed
    #[error("Failed to remove {path}: {source}")]
    Teardown {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new fetch error for the named source
    pub fn fetch_error(source_name: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Fetch {
            source_name: source_name.into(),
            source,
        }
    }

    /// Create a new publish error for the named source
    pub fn publish_error(source_name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Publish {
            source_name: source_name.into(),
            source,
        }
    }

    /// Whether this error was raised while validating configuration.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = HostError::config_error("Port must be between 1 and 65535");
        assert!(err.is_config());
        assert_eq!(
            err.to_string(),
            "Configuration error: Port must be between 1 and 65535"
        );
    }

    #[test]
    fn test_fetch_error_names_source() {
        let err = HostError::fetch_error("temp1", anyhow::anyhow!("sensor offline"));
        let msg = err.to_string();
        assert!(msg.contains("temp1"));
        assert!(msg.contains("sensor offline"));
        assert!(!err.is_config());
    }
}
