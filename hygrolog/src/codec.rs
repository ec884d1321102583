//! Line codec for stored readings.
//!
//! Every reading is persisted as one line of text:
//!
//! ```text
//! 2024-06-01 10:00:00, 21.50°C, 45.30%
//! ```
//!
//! The format has no escaping. The timestamp is always rendered with
//! [`TIMESTAMP_FORMAT`] and the values as fixed two-decimal numbers, so none
//! of the fields can contain the `,` delimiter.
//!
//! Decoding is deliberately shallow: the line is split on its first two
//! commas and each field is kept as text, units included. Callers that only
//! render or filter rows never pay for float parsing.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::RecordError;

/// `strftime` pattern used for stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `strftime` pattern for the date portion of a stored timestamp.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Length in bytes of the `YYYY-MM-DD` prefix of a stored timestamp.
const DATE_LEN: usize = 10;

/// A single sample on the write path.
///
/// Temperature and humidity may be NaN: the sensor node substitutes NaN for
/// out-of-range transducer reads and the store keeps them as-is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Civil (local) time the reading was taken.
    pub timestamp: NaiveDateTime,
    /// Temperature in degrees Celsius.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
}

impl Reading {
    /// Creates a reading.
    pub fn new(timestamp: NaiveDateTime, temperature: f32, humidity: f32) -> Self {
        Self {
            timestamp,
            temperature,
            humidity,
        }
    }

    /// Returns `true` if either value carries the invalid-value sentinel.
    pub fn is_invalid(&self) -> bool {
        self.temperature.is_nan() || self.humidity.is_nan()
    }
}

/// A stored line decoded into its three text fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Timestamp text, `YYYY-MM-DD HH:MM:SS` for lines written by this crate.
    pub timestamp: String,
    /// Temperature field verbatim, e.g. `21.50°C`.
    pub temperature: String,
    /// Humidity field verbatim, e.g. `45.30%`.
    pub humidity: String,
}

impl Record {
    /// Returns the date portion of the timestamp (`YYYY-MM-DD`).
    ///
    /// Timestamps shorter than a date are returned whole.
    pub fn date(&self) -> &str {
        self.timestamp.get(..DATE_LEN).unwrap_or(&self.timestamp)
    }
}

/// Formats a reading as one newline-terminated line.
pub fn encode(reading: &Reading) -> String {
    format!(
        "{}, {:.2}°C, {:.2}%\n",
        reading.timestamp.format(TIMESTAMP_FORMAT),
        reading.temperature,
        reading.humidity
    )
}

/// Parses one stored line.
///
/// A trailing `\n` or `\r\n` is tolerated. Whitespace around each field is
/// trimmed; everything after the second comma becomes the humidity field.
///
/// # Errors
///
/// Returns [`RecordError::Malformed`] if the line has fewer than two commas
/// or an empty timestamp.
pub fn decode(line: &str) -> Result<Record, RecordError> {
    let line = line.trim_end_matches(['\n', '\r']);

    let mut fields = line.splitn(3, ',');
    let (Some(timestamp), Some(temperature), Some(humidity)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(RecordError::Malformed {
            line: line.to_string(),
            reason: "expected three comma-separated fields",
        });
    };

    let timestamp = timestamp.trim();
    if timestamp.is_empty() {
        return Err(RecordError::Malformed {
            line: line.to_string(),
            reason: "empty timestamp",
        });
    }

    Ok(Record {
        timestamp: timestamp.to_string(),
        temperature: temperature.trim().to_string(),
        humidity: humidity.trim().to_string(),
    })
}
