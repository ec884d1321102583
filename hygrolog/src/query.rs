//! Query engine over the partition store.
//!
//! Four retrieval modes are supported:
//!
//! - **Latest**: the last well-formed record of the current month
//! - **Day**: records of the current month whose date is today
//! - **Month**: every record of the current month
//! - **All**: every record of every month, newest month first
//!
//! Partitions carry no index, so every mode is a sequential scan. Results
//! are returned as a [`History`], a lazy iterator that opens one partition at
//! a time and holds one line in memory. An empty result is "no data" and is
//! not an error; a partition that cannot be opened or read is.
//!
//! # Ordering
//!
//! Within a partition records come back in file (append) order, which is
//! chronological. The all-history mode visits partitions in descending
//! [`YearMonth`] order, so the newest month is listed first while each month
//! stays in ascending order.
//!
//! # Example
//!
//! ```rust,no_run
//! use hygrolog::partition::PartitionStore;
//! use hygrolog::query::{HistoryMode, QueryEngine};
//! # use chrono::NaiveDate;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(10, 0, 0).unwrap();
//! let store = PartitionStore::open("./data")?;
//! let engine = QueryEngine::new(&store);
//!
//! if let Some(record) = engine.latest("Bedroom", now)? {
//!     println!("{}: {} {}", record.timestamp, record.temperature, record.humidity);
//! }
//!
//! for record in engine.history("Bedroom", HistoryMode::All, now)? {
//!     let record = record?;
//!     println!("{}", record.timestamp);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::codec::{DATE_FORMAT, Record};
use crate::error::{RequestError, Result};
use crate::partition::{PartitionReader, PartitionStore, YearMonth};

/// Which slice of a sensor's history to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryMode {
    /// Today's records (`D`).
    Day,
    /// This month's records (`M`).
    Month,
    /// All records, newest month first (`A`).
    All,
}

impl HistoryMode {
    /// Returns the single-letter code used in query strings.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Day => "D",
            Self::Month => "M",
            Self::All => "A",
        }
    }

    /// Returns a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Day => "current day",
            Self::Month => "current month",
            Self::All => "full history",
        }
    }
}

impl fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for HistoryMode {
    type Err = RequestError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "D" => Ok(Self::Day),
            "M" => Ok(Self::Month),
            "A" => Ok(Self::All),
            other => Err(RequestError::InvalidHistoryType {
                value: other.to_string(),
            }),
        }
    }
}

/// Stateless query front-end borrowing a [`PartitionStore`].
#[derive(Debug, Clone, Copy)]
pub struct QueryEngine<'a> {
    store: &'a PartitionStore,
}

impl<'a> QueryEngine<'a> {
    /// Creates an engine over `store`.
    pub fn new(store: &'a PartitionStore) -> Self {
        Self { store }
    }

    /// Returns the last well-formed record in the partition for `now`'s month.
    ///
    /// Returns `Ok(None)` if the partition does not exist or holds no
    /// well-formed line.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the partition cannot be opened or read.
    pub fn latest(&self, sensor: &str, now: NaiveDateTime) -> Result<Option<Record>> {
        let Some(reader) = self.store.open_partition(sensor, YearMonth::of(&now))? else {
            return Ok(None);
        };

        let mut last = None;
        for record in reader {
            last = Some(record?);
        }
        Ok(last)
    }

    /// Returns the records of `now`'s month that were taken on `now`'s date.
    ///
    /// A day never spans two months, so only the current partition is read.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the partition exists but cannot be opened.
    pub fn day(&self, sensor: &str, now: NaiveDateTime) -> Result<History<'a>> {
        let reader = self.store.open_partition(sensor, YearMonth::of(&now))?;
        let day = now.format(DATE_FORMAT).to_string();
        Ok(History::single(self.store, sensor, HistoryMode::Day, reader, Some(day)))
    }

    /// Returns every record of `now`'s month.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the partition exists but cannot be opened.
    pub fn month(&self, sensor: &str, now: NaiveDateTime) -> Result<History<'a>> {
        self.month_of(sensor, YearMonth::of(&now))
    }

    /// Returns every record of an arbitrary month.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the partition exists but cannot be opened.
    pub fn month_of(&self, sensor: &str, month: YearMonth) -> Result<History<'a>> {
        let reader = self.store.open_partition(sensor, month)?;
        Ok(History::single(self.store, sensor, HistoryMode::Month, reader, None))
    }

    /// Returns every record of every partition, newest month first.
    ///
    /// Partitions are opened one at a time as the iterator advances.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the sensor directory cannot be listed.
    pub fn all(&self, sensor: &str) -> Result<History<'a>> {
        let months = self.store.list_partitions(sensor)?;
        Ok(History {
            store: self.store,
            sensor: sensor.to_string(),
            mode: HistoryMode::All,
            pending: months.into_iter(),
            current: None,
            day: None,
        })
    }

    /// Dispatches to [`day`](Self::day), [`month`](Self::month) or [`all`](Self::all).
    ///
    /// # Errors
    ///
    /// See the individual modes.
    pub fn history(
        &self,
        sensor: &str,
        mode: HistoryMode,
        now: NaiveDateTime,
    ) -> Result<History<'a>> {
        match mode {
            HistoryMode::Day => self.day(sensor, now),
            HistoryMode::Month => self.month(sensor, now),
            HistoryMode::All => self.all(sensor),
        }
    }
}

/// Lazy result of a history query.
///
/// Yields `Ok(record)` in result order. A storage error is yielded in place
/// of the records it hides; iteration may continue with the next partition.
#[derive(Debug)]
pub struct History<'a> {
    store: &'a PartitionStore,
    sensor: String,
    mode: HistoryMode,
    /// Partitions not yet opened, in visiting order.
    pending: std::vec::IntoIter<YearMonth>,
    current: Option<PartitionReader>,
    /// `YYYY-MM-DD` filter for day queries.
    day: Option<String>,
}

impl<'a> History<'a> {
    fn single(
        store: &'a PartitionStore,
        sensor: &str,
        mode: HistoryMode,
        reader: Option<PartitionReader>,
        day: Option<String>,
    ) -> Self {
        Self {
            store,
            sensor: sensor.to_string(),
            mode,
            pending: Vec::new().into_iter(),
            current: reader,
            day,
        }
    }

    /// Returns the mode this history was produced by.
    pub fn mode(&self) -> HistoryMode {
        self.mode
    }

    /// Returns the sensor being queried.
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    /// Returns the number of partitions not yet opened.
    pub fn remaining_partitions(&self) -> usize {
        self.pending.len()
    }
}

impl Iterator for History<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(reader) = self.current.as_mut() {
                match reader.next() {
                    Some(Ok(record)) => {
                        if let Some(day) = &self.day
                            && record.date() != day
                        {
                            continue;
                        }
                        return Some(Ok(record));
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.current = None,
                }
            }

            let month = self.pending.next()?;
            match self.store.open_partition(&self.sensor, month) {
                Ok(reader) => self.current = reader,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
