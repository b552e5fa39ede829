//! The interface every polled source implements.

use async_trait::async_trait;

/// One reading: field name to arbitrary JSON value.
pub type Readings = serde_json::Map<String, serde_json::Value>;

/// A data provider the poller asks for its current readings.
///
/// Implementations own their transport and error semantics. The poller only
/// needs the call to eventually resolve or fail; no timeout is imposed on it.
#[async_trait]
pub trait Source: Send + Sync {
    /// Unique name; used as the source's directory under the generation root.
    fn name(&self) -> &str;

    /// Fetch the current readings.
    async fn get_readings(&self) -> anyhow::Result<Readings>;
}
