//! The collector context: partition store, sensor registry and clock in one
//! handle.
//!
//! The HTTP server owns exactly one [`Collector`] and processes one request
//! at a time against it, which is what serializes writes to each partition.
//!
//! # Example
//!
//! ```rust,no_run
//! use hygrolog::{Collector, HistoryMode, Submission, SystemClock};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut collector = Collector::open("./data", SystemClock::local())?;
//!
//! collector.ingest(&Submission::from_pairs([
//!     ("name", "Bedroom"),
//!     ("temperature", "21.50"),
//!     ("humidity", "45.30"),
//! ]))?;
//!
//! for record in collector.history("Bedroom", HistoryMode::Day)? {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use chrono::NaiveDateTime;

use crate::clock::{Clock, SystemClock};
use crate::codec::Record;
use crate::config::CollectorConfig;
use crate::error::Result;
use crate::ingest::{self, Ingested, Submission};
use crate::partition::{PartitionStore, validate_sensor_name};
use crate::query::{History, HistoryMode, QueryEngine};
use crate::registry::SensorRegistry;

/// Server-side context tying storage, registry and time source together.
#[derive(Debug)]
pub struct Collector<C = SystemClock> {
    store: PartitionStore,
    registry: SensorRegistry,
    clock: C,
}

impl Collector<SystemClock> {
    /// Opens the collector described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the clock settings are invalid or the data
    /// directory cannot be opened or listed.
    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        Self::open(&config.data_dir, config.clock.build()?)
    }
}

impl<C: Clock> Collector<C> {
    /// Opens the data directory and rebuilds the sensor registry from it.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the data directory cannot be created or listed.
    pub fn open<P: AsRef<Path>>(data_dir: P, clock: C) -> Result<Self> {
        let store = PartitionStore::open(data_dir)?;
        let registry = SensorRegistry::rebuild(&store)?;
        Ok(Self {
            store,
            registry,
            clock,
        })
    }

    /// Stores one submission. See [`ingest::ingest`].
    ///
    /// # Errors
    ///
    /// Returns request, clock or storage errors as described there.
    pub fn ingest(&mut self, submission: &Submission) -> Result<Ingested> {
        ingest::ingest(&self.store, &mut self.registry, &self.clock, submission)
    }

    /// Returns the last reading of `sensor` in the current month, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the clock is unsynchronized,
    /// or the partition cannot be read.
    pub fn latest(&self, sensor: &str) -> Result<Option<Record>> {
        validate_sensor_name(sensor)?;
        let now = self.clock.now()?;
        QueryEngine::new(&self.store).latest(sensor, now)
    }

    /// Returns `sensor`'s history in the given mode, relative to now.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the clock is unsynchronized,
    /// or the partition or directory cannot be opened.
    pub fn history(&self, sensor: &str, mode: HistoryMode) -> Result<History<'_>> {
        validate_sensor_name(sensor)?;
        let now = self.clock.now()?;
        QueryEngine::new(&self.store).history(sensor, mode, now)
    }

    /// Returns the known sensors in first-seen order.
    pub fn sensors(&self) -> &[String] {
        self.registry.list()
    }

    /// Returns the current time from the collector's clock.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ClockError::TimeUnavailable`] if unsynchronized.
    pub fn now(&self) -> Result<NaiveDateTime> {
        self.clock.now()
    }

    /// Returns the underlying partition store.
    pub fn store(&self) -> &PartitionStore {
        &self.store
    }

    /// Returns the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
