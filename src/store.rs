//! On-disk snapshot store.
//!
//! Layout of one generation:
//!
//! ```text
//! <root>/<source>/current.json   latest complete snapshot
//! <root>/<source>/next.json      transient, only while a write is in flight
//! ```
//!
//! Snapshots are written with the write-fsync-rename pattern. The temporary
//! file sits next to the canonical one, so the rename never crosses a
//! filesystem and readers of `current.json` only ever see whole documents.

use crate::error::{HostError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Canonical snapshot file name.
pub const CURRENT_FILE: &str = "current.json";

/// Temporary file name used while a snapshot is being written.
pub const NEXT_FILE: &str = "next.json";

/// What happened to a publish request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// `current.json` now holds the new snapshot
    Written,
    /// The source directory was gone (generation already torn down)
    Dropped,
}

/// Handle to one generation's snapshot directory.
///
/// Clones share per-source writer locks, so a scheduled tick and a manual
/// refresh never interleave writes to the same `next.json`. Once teardown
/// has started, every clone drops its publishes.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
    writers: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    closed: Arc<AtomicBool>,
}

impl SnapshotStore {
    /// Refer to an existing root without touching the filesystem.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writers: Arc::default(),
            closed: Arc::default(),
        }
    }

    /// Create `root` and one subdirectory per source.
    ///
    /// `root` itself must not exist yet, so two generations never share it.
    pub async fn init<S: AsRef<str>>(root: impl Into<PathBuf>, source_names: &[S]) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir(&store.root)
            .await
            .map_err(|source| HostError::StoreInit {
                path: store.root.clone(),
                source,
            })?;

        for name in source_names {
            let dir = store.source_dir(name.as_ref());
            if let Err(source) = fs::create_dir_all(&dir).await {
                // Leave nothing behind for a generation that never started.
                let _ = fs::remove_dir_all(&store.root).await;
                return Err(HostError::StoreInit { path: dir, source });
            }
        }

        info!(root_dir = %store.root.display(), "Created temp directory");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, source_name: &str) -> PathBuf {
        self.root.join(source_name)
    }

    /// Path of the canonical snapshot for a source.
    pub fn current_path(&self, source_name: &str) -> PathBuf {
        self.source_dir(source_name).join(CURRENT_FILE)
    }

    /// Atomically replace the source's `current.json` with `data`.
    ///
    /// On failure the previous snapshot is left untouched. Publishing into a
    /// directory that has already been torn down is not an error.
    pub async fn publish<T: Serialize + ?Sized>(
        &self,
        source_name: &str,
        data: &T,
    ) -> Result<PublishOutcome> {
        let json = serde_json::to_vec_pretty(data).map_err(|source| HostError::Serialize {
            source_name: source_name.to_string(),
            source,
        })?;

        let dir = self.source_dir(source_name);
        let next = dir.join(NEXT_FILE);
        let current = dir.join(CURRENT_FILE);

        let writer = self.writer_lock(source_name);
        let _guard = writer.lock().await;
        if self.closed.load(Ordering::Acquire) {
            debug!(source = source_name, "Store torn down, dropping snapshot");
            return Ok(PublishOutcome::Dropped);
        }
        let written = async {
            let mut file = fs::File::create(&next).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&next, &current).await
        }
        .await;

        let err = match written {
            Ok(()) => {
                debug!(source = source_name, bytes = json.len(), "Published snapshot");
                return Ok(PublishOutcome::Written);
            }
            Err(e) => e,
        };

        if err.kind() == ErrorKind::NotFound && !dir_exists(&dir).await {
            debug!(source = source_name, "Source directory gone, dropping snapshot");
            return Ok(PublishOutcome::Dropped);
        }
        let _ = fs::remove_file(&next).await;
        Err(HostError::publish_error(source_name, err))
    }

    fn writer_lock(&self, source_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = self.writers.lock().unwrap_or_else(PoisonError::into_inner);
        writers.entry(source_name.to_string()).or_default().clone()
    }

    /// Recursively remove the root directory.
    ///
    /// Later publishes through any clone are dropped, and writes already in
    /// progress finish before removal starts. A root that is already gone
    /// counts as success.
    pub async fn teardown(&self) -> Result<()> {
        self.close();
        let writers: Vec<_> = self
            .writers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for writer in writers {
            drop(writer.lock().await);
        }

        match fs::remove_dir_all(&self.root).await {
            Ok(()) => {
                info!(root_dir = %self.root.display(), "Removed temp directory");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HostError::Teardown {
                path: self.root.clone(),
                source,
            }),
        }
    }

    /// Drop every later publish without touching the filesystem.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
