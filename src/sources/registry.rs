//! Name-to-handle lookup for sources.

use crate::sources::Source;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Shared handle to a source.
pub type SourceHandle = Arc<dyn Source>;

/// The set of sources a host can be configured with.
#[derive(Default, Clone)]
pub struct SourceRegistry {
    sources: HashMap<String, SourceHandle>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name, replacing any previous entry.
    pub fn register(&mut self, source: SourceHandle) -> &mut Self {
        self.sources.insert(source.name().to_string(), source);
        self
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_source(mut self, source: SourceHandle) -> Self {
        self.register(source);
        self
    }

    pub fn get(&self, name: &str) -> Option<SourceHandle> {
        self.sources.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve names to handles, keeping the given order.
    ///
    /// Unknown names are dropped with a warning rather than failing the whole
    /// configuration.
    pub fn resolve(&self, names: &[String]) -> Vec<(String, SourceHandle)> {
        names
            .iter()
            .filter_map(|name| match self.get(name) {
                Some(source) => Some((name.clone(), source)),
                None => {
                    warn!(source = %name, "Sensor '{}' not found in dependencies", name);
                    None
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.names())
            .finish()
    }
}
