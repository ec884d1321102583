//! Collector configuration.
//!
//! The collector reads an optional JSON file; every field has a default so an
//! empty object (or no file at all) yields a working configuration. Command
//! line flags override individual fields after loading.
//!
//! ```json
//! {
//!   "data_dir": "/sd",
//!   "port": 80,
//!   "clock": { "utc_offset_secs": 7200 }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::{DEFAULT_MIN_VALID_YEAR, SystemClock};
use crate::error::{ConfigError, Result};

/// Top-level collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CollectorConfig {
    /// Root of the partition tree.
    pub data_dir: PathBuf,
    /// Address the HTTP server binds to.
    pub bind: String,
    /// Port the HTTP server listens on.
    pub port: u16,
    /// Read timeout applied to each accepted connection.
    pub request_timeout_secs: u64,
    /// Time source settings.
    pub clock: ClockConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            bind: "0.0.0.0".to_string(),
            port: 80,
            request_timeout_secs: 5,
            clock: ClockConfig::default(),
        }
    }
}

/// Time source settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    /// Fixed offset east of UTC in seconds; `None` uses the host time zone.
    pub utc_offset_secs: Option<i32>,
    /// Clock readings before this year are treated as unsynchronized.
    pub min_valid_year: i32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: None,
            min_valid_year: DEFAULT_MIN_VALID_YEAR,
        }
    }
}

impl ClockConfig {
    /// Builds the system clock described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns a clock error if the UTC offset is out of range.
    pub fn build(&self) -> Result<SystemClock> {
        let clock = match self.utc_offset_secs {
            Some(seconds) => SystemClock::with_offset(seconds)?,
            None => SystemClock::local(),
        };
        Ok(clock.min_valid_year(self.min_valid_year))
    }
}

impl CollectorConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first field out of range.
    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(invalid("data_dir", "must not be empty"));
        }
        if self.bind.trim().is_empty() {
            return Err(invalid("bind", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs", "must be > 0"));
        }
        if !(1970..=9999).contains(&self.clock.min_valid_year) {
            return Err(invalid(
                "clock.min_valid_year",
                format!("{} is outside 1970..=9999", self.clock.min_valid_year),
            ));
        }
        if let Some(seconds) = self.clock.utc_offset_secs
            && seconds.unsigned_abs() >= 86_400
        {
            return Err(invalid(
                "clock.utc_offset_secs",
                format!("{seconds} is not within one day of UTC"),
            ));
        }
        Ok(())
    }

    /// Returns the `host:port` string the server binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Returns the per-connection read timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> crate::error::HygroError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HygroError;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = CollectorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:80");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("collector.json");
        fs::write(&path, r#"{"data_dir": "/sd", "clock": {"utc_offset_secs": 7200}}"#).unwrap();

        let config = CollectorConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/sd"));
        assert_eq!(config.port, 80);
        assert_eq!(config.clock.utc_offset_secs, Some(7200));
        assert_eq!(config.clock.min_valid_year, DEFAULT_MIN_VALID_YEAR);
        assert!(config.clock.build().is_ok());
    }

    #[test]
    fn test_load_rejects_unknown_fields() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("collector.json");
        fs::write(&path, r#"{"data_directory": "/sd"}"#).unwrap();

        let err = CollectorConfig::load(&path).unwrap_err();
        assert!(matches!(err, HygroError::Config(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_load_missing_file() {
        let err = CollectorConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, HygroError::Config(ConfigError::Read { .. })));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = CollectorConfig {
            request_timeout_secs: 0,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());

        config.request_timeout_secs = 5;
        config.clock.utc_offset_secs = Some(-86_400);
        assert!(matches!(
            config.validate(),
            Err(HygroError::Config(ConfigError::InvalidValue {
                field: "clock.utc_offset_secs",
                ..
            }))
        ));

        config.clock.utc_offset_secs = Some(-3600);
        config.clock.min_valid_year = 1900;
        assert!(config.validate().is_err());
    }
}
