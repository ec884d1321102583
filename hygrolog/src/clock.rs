//! Wall-clock seam.
//!
//! Storage and queries need the current civil time to pick the month
//! partition and the day filter. The collector gets that time from NTP; until
//! the first sync the system clock reads some time near the epoch and every
//! time-dependent operation must fail instead of writing into `1970-01.txt`.

use std::cell::Cell;

use chrono::{Datelike, FixedOffset, Local, NaiveDateTime, Utc};

use crate::error::{ClockError, Result};

/// Earliest year a synchronized clock can report.
pub const DEFAULT_MIN_VALID_YEAR: i32 = 2016;

/// Source of the current civil date and time.
pub trait Clock {
    /// Returns the current local time.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::TimeUnavailable`] if the clock is not synchronized.
    fn now(&self) -> Result<NaiveDateTime>;
}

/// Which time zone the system clock is read in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// The host's local time zone, daylight saving included.
    Local,
    /// A fixed offset from UTC.
    Fixed(FixedOffset),
}

/// The host's clock, treated as unsynchronized while it reads a year before
/// `min_valid_year`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Zone,
    min_valid_year: i32,
}

impl SystemClock {
    /// Reads the host clock in the local time zone.
    pub fn local() -> Self {
        Self {
            zone: Zone::Local,
            min_valid_year: DEFAULT_MIN_VALID_YEAR,
        }
    }

    /// Reads the host clock at a fixed offset of `seconds` east of UTC.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidOffset`] if the offset is a day or more.
    pub fn with_offset(seconds: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(seconds).ok_or(ClockError::InvalidOffset { seconds })?;
        Ok(Self {
            zone: Zone::Fixed(offset),
            min_valid_year: DEFAULT_MIN_VALID_YEAR,
        })
    }

    /// Overrides the earliest year accepted as synchronized.
    #[must_use]
    pub fn min_valid_year(mut self, year: i32) -> Self {
        self.min_valid_year = year;
        self
    }

    /// Returns the zone the clock is read in.
    pub fn zone(&self) -> Zone {
        self.zone
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::local()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<NaiveDateTime> {
        let now = match self.zone {
            Zone::Local => Local::now().naive_local(),
            Zone::Fixed(offset) => Utc::now().with_timezone(&offset).naive_local(),
        };
        check_synchronized(now, self.min_valid_year)
    }
}

/// A clock that always reports the instant it was last set to.
///
/// Used by tests and by offline tools that query "as of" a given time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Cell<Option<NaiveDateTime>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Cell::new(Some(now)),
        }
    }

    /// Creates a clock that has never been synchronized.
    pub fn unsynchronized() -> Self {
        Self { now: Cell::new(None) }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        self.now.set(Some(now));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Result<NaiveDateTime> {
        self.now.get().ok_or_else(|| {
            ClockError::TimeUnavailable {
                year: 1970,
                min_valid_year: DEFAULT_MIN_VALID_YEAR,
            }
            .into()
        })
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Result<NaiveDateTime> {
        (**self).now()
    }
}

fn check_synchronized(now: NaiveDateTime, min_valid_year: i32) -> Result<NaiveDateTime> {
    if now.year() < min_valid_year {
        return Err(ClockError::TimeUnavailable {
            year: now.year(),
            min_valid_year,
        }
        .into());
    }
    Ok(now)
}
