//! Write path: validate a submission, stamp it, append it, register the sensor.
//!
//! A sensor node sends one submission per wake cycle and never retries, so
//! the handler does all of its validation before touching storage: a rejected
//! submission leaves no trace on disk or in the registry.

use std::path::PathBuf;

use crate::clock::Clock;
use crate::codec::Reading;
use crate::error::{RequestError, Result};
use crate::partition::{PartitionStore, validate_sensor_name};
use crate::registry::SensorRegistry;

/// Raw query parameters of a `/receiveData` request.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Sensor name.
    pub name: Option<String>,
    /// Temperature as sent by the sensor node.
    pub temperature: Option<String>,
    /// Humidity as sent by the sensor node.
    pub humidity: Option<String>,
}

impl Submission {
    /// Builds a submission from decoded key/value pairs.
    ///
    /// The first occurrence of each key wins; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut submission = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "name" => &mut submission.name,
                "temperature" => &mut submission.temperature,
                "humidity" => &mut submission.humidity,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        submission
    }
}

/// What an accepted submission turned into.
#[derive(Debug, Clone, PartialEq)]
pub struct Ingested {
    /// The sensor the reading was filed under.
    pub sensor: String,
    /// The stored reading.
    pub reading: Reading,
    /// The partition file that was appended to.
    pub path: PathBuf,
    /// `true` if this was the first reading seen from this sensor.
    pub new_sensor: bool,
}

/// Validates `submission`, appends it to the current month's partition and
/// registers the sensor.
///
/// Values that do not parse as numbers are stored as the NaN sentinel; the
/// store keeps invalid readings rather than dropping them.
///
/// # Errors
///
/// - [`RequestError::MissingParameter`] if any of the three parameters is absent
/// - [`RequestError::InvalidSensorName`] if the name cannot be a directory name
/// - [`crate::error::ClockError::TimeUnavailable`] if the clock is not synchronized
/// - a storage error if the append fails
pub fn ingest<C: Clock + ?Sized>(
    store: &PartitionStore,
    registry: &mut SensorRegistry,
    clock: &C,
    submission: &Submission,
) -> Result<Ingested> {
    let name = required(submission.name.as_deref(), "name")?;
    let temperature = required(submission.temperature.as_deref(), "temperature")?;
    let humidity = required(submission.humidity.as_deref(), "humidity")?;

    validate_sensor_name(name)?;

    let reading = Reading::new(
        clock.now()?,
        parse_value(name, "temperature", temperature),
        parse_value(name, "humidity", humidity),
    );

    let path = store.append(name, &reading)?;
    let new_sensor = registry.register(name);
    if new_sensor {
        tracing::info!(sensor = name, "registered new sensor");
    }

    tracing::info!(
        sensor = name,
        temperature = reading.temperature,
        humidity = reading.humidity,
        "stored reading"
    );

    Ok(Ingested {
        sensor: name.to_string(),
        reading,
        path,
        new_sensor,
    })
}

fn required<'a>(
    value: Option<&'a str>,
    name: &'static str,
) -> std::result::Result<&'a str, RequestError> {
    value.ok_or(RequestError::MissingParameter { name })
}

fn parse_value(sensor: &str, field: &str, text: &str) -> f32 {
    text.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(sensor, field, value = text, "unparsable value stored as NaN");
        f32::NAN
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::codec::TIMESTAMP_FORMAT;
    use crate::error::{ClockError, HygroError};
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    fn clock_at(s: &str) -> FixedClock {
        FixedClock::new(NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap())
    }

    fn submission(name: &str, temperature: &str, humidity: &str) -> Submission {
        Submission::from_pairs([
            ("name", name),
            ("temperature", temperature),
            ("humidity", humidity),
        ])
    }

    #[test]
    fn test_from_pairs_first_wins() {
        let s = Submission::from_pairs([
            ("name", "a"),
            ("name", "b"),
            ("other", "x"),
            ("humidity", "1"),
        ]);
        assert_eq!(s.name.as_deref(), Some("a"));
        assert_eq!(s.temperature, None);
        assert_eq!(s.humidity.as_deref(), Some("1"));
    }

    #[test]
    fn test_ingest_appends_and_registers() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = clock_at("2024-06-01 10:00:00");

        let s = submission("Bedroom", "21.50", "45.30");
        let ingested = ingest(&store, &mut registry, &clock, &s).unwrap();

        assert!(ingested.new_sensor);
        assert_eq!(ingested.path, temp_dir.path().join("Bedroom/2024-06.txt"));
        assert_eq!(
            std::fs::read_to_string(&ingested.path).unwrap(),
            "2024-06-01 10:00:00, 21.50°C, 45.30%\n"
        );
        assert_eq!(registry.list(), ["Bedroom"]);
    }

    #[test]
    fn test_ingest_twice_registers_once_appends_twice() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = clock_at("2024-06-01 10:00:00");
        let s = submission("Bedroom", "21.5", "45.3");

        assert!(ingest(&store, &mut registry, &clock, &s).unwrap().new_sensor);
        assert!(!ingest(&store, &mut registry, &clock, &s).unwrap().new_sensor);

        assert_eq!(registry.len(), 1);
        let path = temp_dir.path().join("Bedroom/2024-06.txt");
        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }

    #[test]
    fn test_missing_parameter_has_no_side_effects() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = clock_at("2024-06-01 10:00:00");

        let s = Submission::from_pairs([("name", "Bedroom"), ("temperature", "21.5")]);
        let err = ingest(&store, &mut registry, &clock, &s).unwrap_err();

        assert!(matches!(
            err,
            HygroError::Request(RequestError::MissingParameter { name: "humidity" })
        ));
        assert!(registry.is_empty());
        assert!(!temp_dir.path().join("Bedroom").exists());
    }

    #[test]
    fn test_unsynchronized_clock_has_no_side_effects() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = FixedClock::unsynchronized();

        let s = submission("Bedroom", "1", "2");
        let err = ingest(&store, &mut registry, &clock, &s).unwrap_err();

        assert!(matches!(err, HygroError::Clock(ClockError::TimeUnavailable { .. })));
        assert!(err.is_client_error());
        assert!(registry.is_empty());
        assert!(!temp_dir.path().join("Bedroom").exists());
    }

    #[test]
    fn test_invalid_name_rejected() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path().join("data")).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = clock_at("2024-06-01 10:00:00");

        let s = submission("../escape", "1", "2");
        let err = ingest(&store, &mut registry, &clock, &s).unwrap_err();
        assert!(matches!(
            err,
            HygroError::Request(RequestError::InvalidSensorName { .. })
        ));
        assert!(!temp_dir.path().join("escape").exists());
    }

    #[test]
    fn test_invalid_values_stored_as_nan() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        let mut registry = SensorRegistry::new();
        let clock = clock_at("2024-06-01 10:00:00");

        let s = submission("Attic", "nan", "oops");
        let ingested = ingest(&store, &mut registry, &clock, &s).unwrap();
        assert!(ingested.reading.is_invalid());
        assert_eq!(
            std::fs::read_to_string(&ingested.path).unwrap(),
            "2024-06-01 10:00:00, NaN°C, NaN%\n"
        );
    }
}
