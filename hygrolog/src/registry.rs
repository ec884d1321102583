//! Registry of known sensor names.
//!
//! The registry backs the sensor selection page. It is owned by the
//! collector context and seeded from the data directory at startup, so a
//! restart does not forget sensors that already have partitions on disk.

use std::collections::HashSet;

use crate::error::Result;
use crate::partition::PartitionStore;

/// Insertion-ordered set of sensor names.
#[derive(Debug, Default, Clone)]
pub struct SensorRegistry {
    names: Vec<String>,
    seen: HashSet<String>,
}

impl SensorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every sensor that has a directory in `store`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be listed.
    pub fn rebuild(store: &PartitionStore) -> Result<Self> {
        let mut registry = Self::new();
        for name in store.list_sensors()? {
            registry.register(&name);
        }
        tracing::info!(sensors = registry.len(), "rebuilt sensor registry");
        Ok(registry)
    }

    /// Adds `name` if it is not yet known. Returns `true` if it was added.
    pub fn register(&mut self, name: &str) -> bool {
        if self.seen.contains(name) {
            return false;
        }
        self.seen.insert(name.to_string());
        self.names.push(name.to_string());
        true
    }

    /// Returns `true` if `name` has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.seen.contains(name)
    }

    /// Returns the registered names in the order they were first seen.
    pub fn list(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of registered sensors.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if no sensor is registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
