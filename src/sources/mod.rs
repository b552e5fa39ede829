//! Sources polled by the sensor host.
//!
//! A source is anything that can asynchronously produce a map of readings.
//! The host resolves configured names through a [`SourceRegistry`], which
//! plays the part of the surrounding framework's dependency map.

pub mod registry;
pub mod system;
pub mod traits;

// Re-export commonly used items
pub use registry::{SourceHandle, SourceRegistry};
pub use system::{SystemSource, ThermalSource};
pub use traits::{Readings, Source};
