//! # hygrolog
//!
//! Month-partitioned flat-file storage for temperature and humidity readings.
//!
//! hygrolog is the storage and query engine of a small sensor network: sensor
//! nodes wake up, take one reading, send it to a collector and go back to
//! sleep. The collector appends each reading to a plain text file on
//! removable storage, one file per sensor and calendar month, and answers
//! queries by scanning those files.
//!
//! ## Key Properties
//!
//! - Human-readable storage: one `timestamp, temp°C, humidity%` line per reading
//! - Append-only partitions, synced on every write
//! - Streaming reads: no query holds more than one line in memory
//! - Deterministic history order: newest month first, chronological within a month
//! - Explicit failure when the clock has not been synchronized
//!
//! ## Quick Start
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
//! if let Some(latest) = collector.latest("Bedroom")? {
//!     println!("{} {} {}", latest.timestamp, latest.temperature, latest.humidity);
//! }
//!
//! for record in collector.history("Bedroom", HistoryMode::All)? {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`codec`] — Line format for stored readings
//! - [`partition`] — Partition store: layout, append, listing, line streams
//! - [`registry`] — Known sensor names
//! - [`query`] — Latest / day / month / all-history retrieval
//! - [`ingest`] — Submission validation and the write path
//! - [`clock`] — Time source seam
//! - [`collector`] — Context object owning all of the above
//! - [`config`] — Collector configuration
//! - [`error`] — Error types

pub mod clock;
pub mod codec;
pub mod collector;
pub mod config;
pub mod error;
pub mod ingest;
pub mod partition;
pub mod query;
pub mod registry;

// Re-export primary API types at crate root for convenience.
pub use clock::{Clock, FixedClock, SystemClock};
pub use codec::{Reading, Record};
pub use collector::Collector;
pub use config::CollectorConfig;
pub use error::{HygroError, Result};
pub use ingest::{Ingested, Submission};
pub use partition::{PartitionStore, YearMonth};
pub use query::{History, HistoryMode, QueryEngine};
pub use registry::SensorRegistry;
