//! # Sensor Host
//!
//! Periodically polls a set of sources, keeps each source's latest reading
//! as a JSON snapshot on disk, and serves those snapshots over plain HTTP.
//!
//! ## Layout
//!
//! - **Snapshot store**: `<root>/<source>/current.json`, replaced atomically
//!   by writing `next.json` and renaming it over the canonical file
//! - **Poller**: one background task per generation refreshing every source
//! - **Publish server**: a static file server rooted at the generation directory
//! - **Lifecycle controller**: [`SensorHost`], which applies configurations and
//!   guarantees at most one live generation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_host::{HostConfig, SensorHost, SourceRegistry, SystemSource};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = SourceRegistry::new().with_source(Arc::new(SystemSource::new("system")));
//!     let host = SensorHost::new(registry);
//!
//!     // Serves GET /system/current.json on port 8080
//!     host.configure(&HostConfig::new(["system"], 8080)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     host.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod poller;
pub mod sources;
pub mod store;
pub mod web;

// Re-export public API
pub use command::Command;
pub use config::{HostConfig, ValidatedConfig};
pub use error::{HostError, Result};
pub use host::{RefreshOutcome, SensorHost, Status};
pub use poller::{PollPass, PollReport, Poller, PollerState};
pub use sources::{Readings, Source, SourceHandle, SourceRegistry, SystemSource, ThermalSource};
pub use store::{PublishOutcome, SnapshotStore, CURRENT_FILE, NEXT_FILE};
pub use web::{PublishServer, ServerConfig};

/// The default refresh interval
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// The default publish server port
pub const DEFAULT_PORT: u16 = 8080;
