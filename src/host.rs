//! Lifecycle controller.
//!
//! [`SensorHost`] owns at most one live [`Generation`]: a snapshot directory,
//! the publish server serving it and the poller filling it. Every
//! `configure` tears the previous generation down completely before the next
//! one is built, and `shutdown` does the same without building a new one.

use crate::command::{error_reply, message_reply, Command};
use crate::config::{HostConfig, ValidatedConfig};
use crate::error::Result;
use crate::poller::{PollPass, PollReport, Poller};
use crate::sources::SourceRegistry;
use crate::store::SnapshotStore;
use crate::web::{PublishServer, ServerConfig};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Prefix of every generation directory name.
pub const ROOT_DIR_PREFIX: &str = "sensor_host_";

/// Snapshot of the controller state, as returned by the `status` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    pub running: bool,
    pub port: u16,
    pub sensors: Vec<String>,
    /// Seconds between scheduled refreshes
    pub refresh_interval: f64,
    /// Generation root directory, empty when not running
    pub temp_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured_at: Option<DateTime<Utc>>,
}

/// Result of a manual refresh request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(PollReport),
    NotRunning,
}

/// Resources bound to one applied configuration.
struct Generation {
    config: ValidatedConfig,
    sources: Vec<String>,
    store: SnapshotStore,
    server: PublishServer,
    poller: Poller,
    configured_at: DateTime<Utc>,
}

impl Generation {
    fn status(&self) -> Status {
        Status {
            running: true,
            port: self.server.local_addr().port(),
            sensors: self.sources.clone(),
            refresh_interval: self.config.refresh_interval.as_secs_f64(),
            temp_dir: self.store.root().display().to_string(),
            configured_at: Some(self.configured_at),
        }
    }

    /// Stop the poller, then the server, then remove the directory.
    async fn teardown(mut self) {
        self.poller.stop().await;
        self.server.stop().await;
        remove_store(&self.store).await;
        info!(port = self.config.port, "HTTP server stopped and resources cleaned up");
    }
}

/// Owns the live generation and serializes every transition between them.
pub struct SensorHost {
    registry: SourceRegistry,
    current: Mutex<Option<Generation>>,
}

impl SensorHost {
    /// Create an idle host that resolves source names through `registry`.
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            current: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Apply a configuration, replacing any live generation.
    ///
    /// Validation happens before anything is touched. If the new generation
    /// fails to start, whatever part of it was started is rolled back and the
    /// host is left with nothing live.
    pub async fn configure(&self, config: &HostConfig) -> Result<Status> {
        let config = config.validate()?;
        let sources = self.registry.resolve(&config.sensors);
        if sources.is_empty() {
            warn!("None of the configured sensors were found, serving an empty tree");
        }

        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            previous.teardown().await;
        }

        let names: Vec<String> = sources.iter().map(|(name, _)| name.clone()).collect();
        let root = generation_dir(&config);
        let store = SnapshotStore::init(root, &names).await?;

        let server_config = ServerConfig::new(config.port).with_cors(config.enable_cors);
        let mut server = match PublishServer::start(store.root(), &server_config).await {
            Ok(server) => server,
            Err(e) => {
                error!("Failed to start HTTP server: {}", e);
                remove_store(&store).await;
                return Err(e);
            }
        };

        let mut poller = Poller::new(PollPass::new(sources, store.clone()), config.refresh_interval);
        if let Err(e) = poller.start() {
            server.stop().await;
            remove_store(&store).await;
            return Err(e);
        }

        let generation = Generation {
            config,
            sources: names,
            store,
            server,
            poller,
            configured_at: Utc::now(),
        };
        let status = generation.status();
        *current = Some(generation);

        info!(
            "SensorHost configured with {} sensors on port {}",
            status.sensors.len(),
            status.port
        );
        Ok(status)
    }

    /// Tear down the live generation, if any.
    pub async fn shutdown(&self) {
        let previous = self.current.lock().await.take();
        match previous {
            Some(generation) => generation.teardown().await,
            None => info!("Shutdown requested with nothing running"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Describe the live generation, or an empty status when idle.
    pub async fn status(&self) -> Status {
        self.current
            .lock()
            .await
            .as_ref()
            .map(Generation::status)
            .unwrap_or_default()
    }

    /// Poll every source of the live generation once.
    ///
    /// Runs outside the controller lock so a slow source cannot hold up
    /// reconfiguration; a pass racing with teardown drops its writes.
    pub async fn refresh_now(&self) -> RefreshOutcome {
        let pass = match self.current.lock().await.as_ref() {
            Some(generation) => generation.poller.pass(),
            None => return RefreshOutcome::NotRunning,
        };
        RefreshOutcome::Refreshed(pass.run().await)
    }

    /// Handle an out-of-band command map.
    pub async fn do_command(&self, command: &Map<String, Value>) -> Map<String, Value> {
        match Command::parse(command) {
            Command::Status => match serde_json::to_value(self.status().await) {
                Ok(Value::Object(status)) => status,
                Ok(_) => error_reply("Status is not an object"),
                Err(e) => error_reply(format!("Failed to encode status: {}", e)),
            },
            Command::RefreshNow => match self.refresh_now().await {
                RefreshOutcome::Refreshed(_) => message_reply("Sensor readings refreshed"),
                RefreshOutcome::NotRunning => error_reply("SensorHost not running"),
            },
            Command::Unknown(keys) => error_reply(format!("Unknown command: {:?}", keys)),
        }
    }
}

impl Drop for SensorHost {
    fn drop(&mut self) {
        // Tasks are cancelled by the poller and server handles themselves.
        if let Some(generation) = self.current.get_mut().take() {
            let root = generation.store.root().to_path_buf();
            generation.store.close();
            drop(generation);
            if let Err(e) = std::fs::remove_dir_all(&root) {
                warn!(root_dir = %root.display(), "Failed to remove temp directory on drop: {}", e);
            }
        }
    }
}

async fn remove_store(store: &SnapshotStore) {
    if let Err(e) = store.teardown().await {
        warn!(root_dir = %store.root().display(), "Failed to remove temp directory: {}", e);
    }
}

fn generation_dir(config: &ValidatedConfig) -> PathBuf {
    config
        .base_dir
        .join(format!("{}{}", ROOT_DIR_PREFIX, Uuid::new_v4().simple()))
}
