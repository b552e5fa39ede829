//! HTTP publish server.
//!
//! Serves one generation directory as static files. The listener is bound in
//! [`PublishServer::start`] before the serving task is spawned, so bind
//! failures reach the caller instead of a background task.

pub mod config;
pub mod router;

// Re-export commonly used items
pub use config::ServerConfig;
pub use router::create_app;

use crate::error::{HostError, Result};
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running static file server.
#[derive(Debug)]
pub struct PublishServer {
    local_addr: SocketAddr,
    grace: std::time::Duration,
    shutdown: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl PublishServer {
    /// Bind the configured address and start serving `root`.
    pub async fn start(root: &Path, config: &ServerConfig) -> Result<Self> {
        let addr = config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| HostError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        let app = create_app(root, config);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(signal.cancelled_owned())
                .await
            {
                error!("Publish server error: {}", e);
            }
        });

        info!(
            root_dir = %root.display(),
            "HTTP server started on port {}",
            local_addr.port()
        );

        Ok(Self {
            local_addr,
            grace: config.shutdown_grace,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop accepting connections and let in-flight responses drain.
    ///
    /// Connections still open after the grace period are dropped. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
        let Some(mut task) = self.task.take() else {
            return;
        };

        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            warn!(
                "Publish server did not drain within {:?}, closing remaining connections",
                self.grace
            );
            task.abort();
            let _ = task.await;
        }
        info!("HTTP server on port {} stopped", self.local_addr.port());
    }
}

impl Drop for PublishServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
    }
}
