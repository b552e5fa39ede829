//! Periodic refresh of every configured source.
//!
//! A [`Poller`] owns one background task per generation. Each tick spawns
//! one fetch-and-publish task per source, so a failing or hanging source
//! never holds back the others or later ticks. A source whose previous fetch
//! is still in flight is skipped for that tick.

use crate::error::{HostError, Result};
use crate::sources::SourceHandle;
use crate::store::{PublishOutcome, SnapshotStore};
use futures_util::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How long `stop` waits for an in-flight pass before abandoning it.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Result of one pass over all sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Sources whose snapshot was replaced
    pub published: Vec<String>,
    /// Sources whose fetch or publish failed
    pub failed: Vec<String>,
    /// Sources whose directory had already been removed
    pub dropped: Vec<String>,
}

impl PollReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
enum SourceOutcome {
    Published,
    Failed,
    Dropped,
}

/// One fetch-and-publish sweep over a fixed list of sources.
///
/// Cheap to clone; clones share the source list.
#[derive(Clone)]
pub struct PollPass {
    sources: Arc<[(String, SourceHandle)]>,
    store: SnapshotStore,
}

impl PollPass {
    pub fn new(sources: Vec<(String, SourceHandle)>, store: SnapshotStore) -> Self {
        Self {
            sources: sources.into(),
            store,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Refresh every source once.
    ///
    /// Fetches start in configured order and run concurrently; each result is
    /// published as soon as it arrives.
    pub async fn run(&self) -> PollReport {
        let outcomes = join_all(
            self.sources
                .iter()
                .map(|(name, source)| refresh_source(&self.store, name, source)),
        )
        .await;

        let mut report = PollReport::default();
        for ((name, _), outcome) in self.sources.iter().zip(outcomes) {
            let bucket = match outcome {
                SourceOutcome::Published => &mut report.published,
                SourceOutcome::Failed => &mut report.failed,
                SourceOutcome::Dropped => &mut report.dropped,
            };
            bucket.push(name.clone());
        }
        report
    }

    /// Spawn one refresh task per idle source into `tasks`.
    ///
    /// `in_flight` holds one flag per source, in configured order. Returns the
    /// names of sources skipped because their previous fetch has not finished.
    fn spawn_tick(
        &self,
        in_flight: &[Arc<AtomicBool>],
        tasks: &mut JoinSet<(String, SourceOutcome)>,
    ) -> Vec<String> {
        let mut skipped = Vec::new();
        for ((name, source), busy) in self.sources.iter().zip(in_flight) {
            if busy.swap(true, Ordering::AcqRel) {
                skipped.push(name.clone());
                continue;
            }
            let slot = InFlight(busy.clone());
            let store = self.store.clone();
            let name = name.clone();
            let source = source.clone();
            tasks.spawn(async move {
                let _slot = slot;
                let outcome = refresh_source(&store, &name, &source).await;
                (name, outcome)
            });
        }
        skipped
    }
}

/// Clears a source's in-flight flag when its task finishes or is aborted.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn refresh_source(store: &SnapshotStore, name: &str, source: &SourceHandle) -> SourceOutcome {
    let readings = match source.get_readings().await {
        Ok(readings) => readings,
        Err(e) => {
            let err = HostError::fetch_error(name, e);
            error!(source = name, "{}", err);
            return SourceOutcome::Failed;
        }
    };

    match store.publish(name, &readings).await {
        Ok(PublishOutcome::Written) => SourceOutcome::Published,
        Ok(PublishOutcome::Dropped) => SourceOutcome::Dropped,
        Err(e) => {
            error!(source = name, "{}", e);
            SourceOutcome::Failed
        }
    }
}

/// Background task driving a [`PollPass`] on a fixed interval.
pub struct Poller {
    pass: PollPass,
    interval: Duration,
    state: PollerState,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn new(pass: PollPass, interval: Duration) -> Self {
        Self {
            pass,
            interval,
            state: PollerState::Idle,
            cancel: None,
            task: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// A handle for running passes outside the timer.
    pub fn pass(&self) -> PollPass {
        self.pass.clone()
    }

    /// Schedule a pass every interval. The first one fires one interval from now.
    pub fn start(&mut self) -> Result<()> {
        if matches!(self.state, PollerState::Running | PollerState::Stopping) {
            return Err(HostError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        let pass = self.pass.clone();
        let interval = self.interval;
        let cancelled = token.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let in_flight: Vec<Arc<AtomicBool>> = (0..pass.sources.len())
                .map(|_| Arc::new(AtomicBool::new(false)))
                .collect();
            let mut tasks = JoinSet::new();
            let mut tick: u64 = 0;

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        tick += 1;
                        let skipped = pass.spawn_tick(&in_flight, &mut tasks);
                        if !skipped.is_empty() {
                            debug!(tick, ?skipped, "Previous fetch still running, skipping");
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => match joined {
                        Ok((source, outcome)) => debug!(source = %source, ?outcome, "Refresh finished"),
                        Err(e) if e.is_panic() => error!("Refresh task panicked: {}", e),
                        Err(_) => {}
                    },
                }
            }

            // Fetches still in flight are abandoned.
            tasks.shutdown().await;
            debug!("Refresh loop exited");
        }));
        self.cancel = Some(token);
        self.state = PollerState::Running;

        info!("Started refresh task with {:?} interval", self.interval);
        Ok(())
    }

    /// Stop the timer loop. No-op unless running.
    ///
    /// Scheduled fetches still in flight are aborted. The loop itself gets
    /// [`STOP_JOIN_TIMEOUT`] to exit before it is abandoned.
    pub async fn stop(&mut self) {
        if self.state != PollerState::Running {
            return;
        }
        self.state = PollerState::Stopping;

        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        if let Some(mut task) = self.task.take() {
            if time::timeout(STOP_JOIN_TIMEOUT, &mut task).await.is_err() {
                warn!("Refresh task did not settle in {:?}, abandoning it", STOP_JOIN_TIMEOUT);
                task.abort();
            }
        }

        self.state = PollerState::Stopped;
        info!("Refresh task stopped");
    }

    /// Run one pass now, independent of the timer.
    pub async fn refresh_now(&self) -> PollReport {
        self.pass.run().await
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Readings, Source};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter {
        name: String,
        calls: AtomicU64,
    }

    impl Counter {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl Source for Counter {
        fn name(&self) -> &str {
            &self.name
        }

        async fn get_readings(&self) -> anyhow::Result<Readings> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let mut readings = Readings::new();
            readings.insert("count".into(), json!(n));
            Ok(readings)
        }
    }

    struct Broken;

    #[async_trait]
    impl Source for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn get_readings(&self) -> anyhow::Result<Readings> {
            anyhow::bail!("sensor unplugged")
        }
    }

    struct Hanging {
        calls: AtomicU64,
    }

    impl Hanging {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU64::new(0),
            })
        }
    }

    #[async_trait]
    impl Source for Hanging {
        fn name(&self) -> &str {
            "hanging"
        }

        async fn get_readings(&self) -> anyhow::Result<Readings> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            futures_util::future::pending().await
        }
    }

    async fn store_for(base: &tempfile::TempDir, names: &[&str]) -> SnapshotStore {
        SnapshotStore::init(base.path().join("gen"), names).await.unwrap()
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["a", "broken", "b"]).await;
        let a = Counter::new("a");
        let b = Counter::new("b");
        let pass = PollPass::new(
            vec![
                ("a".into(), a.clone() as SourceHandle),
                ("broken".into(), Arc::new(Broken) as SourceHandle),
                ("b".into(), b.clone() as SourceHandle),
            ],
            store.clone(),
        );

        let report = pass.run().await;
        assert_eq!(report.published, vec!["a", "b"]);
        assert_eq!(report.failed, vec!["broken"]);
        assert!(!report.is_clean());
        assert!(store.current_path("a").exists());
        assert!(store.current_path("b").exists());
        assert!(!store.current_path("broken").exists());
    }

    #[tokio::test]
    async fn test_hanging_source_does_not_delay_others() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["hanging", "a"]).await;
        let pass = PollPass::new(
            vec![
                ("hanging".into(), Hanging::new() as SourceHandle),
                ("a".into(), Counter::new("a") as SourceHandle),
            ],
            store.clone(),
        );

        let handle = tokio::spawn(async move { pass.run().await });
        let current = store.current_path("a");
        let deadline = Instant::now() + Duration::from_secs(2);
        while !current.exists() {
            assert!(Instant::now() < deadline, "source behind a hanging one never published");
            time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
    }

    #[tokio::test]
    async fn test_hanging_source_does_not_stall_later_ticks() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["hanging", "a"]).await;
        let hanging = Hanging::new();
        let a = Counter::new("a");
        let pass = PollPass::new(
            vec![
                ("hanging".into(), hanging.clone() as SourceHandle),
                ("a".into(), a.clone() as SourceHandle),
            ],
            store.clone(),
        );
        let mut poller = Poller::new(pass, Duration::from_millis(50));

        poller.start().unwrap();
        time::sleep(Duration::from_millis(600)).await;

        let started = Instant::now();
        poller.stop().await;
        assert!(started.elapsed() < Duration::from_millis(500), "stop waited on a hanging fetch");

        let calls = a.calls.load(Ordering::SeqCst);
        assert!(calls >= 5, "source 'a' fetched {} times in ~11 intervals", calls);
        // The hanging fetch is never restarted while it is still in flight.
        assert_eq!(hanging.calls.load(Ordering::SeqCst), 1);

        let content = std::fs::read_to_string(store.current_path("a")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value["count"].as_u64().unwrap() >= 5);
        assert!(!store.current_path("hanging").exists());
    }

    #[tokio::test]
    async fn test_start_twice_fails_and_stop_is_idempotent() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["a"]).await;
        let pass = PollPass::new(vec![("a".into(), Counter::new("a") as SourceHandle)], store);
        let mut poller = Poller::new(pass, Duration::from_secs(60));

        poller.stop().await;
        assert_eq!(poller.state(), PollerState::Idle);

        poller.start().unwrap();
        assert_eq!(poller.state(), PollerState::Running);
        assert!(matches!(poller.start(), Err(HostError::AlreadyRunning)));

        poller.stop().await;
        assert_eq!(poller.state(), PollerState::Stopped);
        poller.stop().await;
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test]
    async fn test_ticks_publish_repeatedly() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["a"]).await;
        let a = Counter::new("a");
        let pass = PollPass::new(vec![("a".into(), a.clone() as SourceHandle)], store.clone());
        let mut poller = Poller::new(pass, Duration::from_millis(50));

        poller.start().unwrap();
        time::sleep(Duration::from_millis(400)).await;
        poller.stop().await;

        let calls = a.calls.load(Ordering::SeqCst);
        assert!(calls >= 2, "expected several ticks, got {}", calls);
        let content = std::fs::read_to_string(store.current_path("a")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(value["count"].as_u64().unwrap() >= 2);

        time::sleep(Duration::from_millis(200)).await;
        assert_eq!(a.calls.load(Ordering::SeqCst), calls, "ticks continued after stop");
    }

    #[tokio::test]
    async fn test_stop_abandons_hanging_pass() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["hanging"]).await;
        let pass = PollPass::new(vec![("hanging".into(), Hanging::new() as SourceHandle)], store);
        let mut poller = Poller::new(pass, Duration::from_millis(10));

        poller.start().unwrap();
        time::sleep(Duration::from_millis(50)).await;

        let started = Instant::now();
        poller.stop().await;
        assert!(started.elapsed() < STOP_JOIN_TIMEOUT + Duration::from_millis(500));
        assert_eq!(poller.state(), PollerState::Stopped);
    }

    #[tokio::test]
    async fn test_refresh_now_without_timer() {
        let base = tempfile::tempdir().unwrap();
        let store = store_for(&base, &["a"]).await;
        let pass = PollPass::new(vec![("a".into(), Counter::new("a") as SourceHandle)], store.clone());
        let poller = Poller::new(pass, Duration::from_secs(60));

        let report = poller.refresh_now().await;
        assert_eq!(report.published, vec!["a"]);
        assert_eq!(poller.state(), PollerState::Idle);
        assert!(store.current_path("a").exists());
    }
}
