//! Error types for the hygrolog storage and query engine.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all hygrolog operations.
///
/// Each variant wraps the error enum of one concern so callers can match on
/// the layer that failed (request validation, time source, storage or
/// configuration) without caring about the details.
#[derive(Error, Debug)]
pub enum HygroError {
    /// An inbound submission or query was rejected before touching storage.
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    /// The wall clock could not provide a trustworthy "now".
    #[error("clock error: {0}")]
    Clock(#[from] ClockError),

    /// A directory or partition file could not be created, opened, or read.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The collector configuration is invalid or unreadable.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl HygroError {
    /// Returns `true` for errors caused by the caller's input or by the
    /// device state at request time, as opposed to storage faults.
    ///
    /// The HTTP layer maps these to `400 Bad Request`.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Clock(_))
    }
}

/// Errors raised while validating an inbound request.
#[derive(Error, Debug)]
pub enum RequestError {
    /// A required query parameter is absent.
    #[error("missing parameter '{name}'")]
    MissingParameter {
        /// The parameter name.
        name: &'static str,
    },

    /// The sensor name cannot be used as a directory name.
    #[error("invalid sensor name '{name}': {reason}")]
    InvalidSensorName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// The history `type` parameter is not one of `D`, `M`, `A`.
    #[error("invalid history type '{value}' (expected D, M or A)")]
    InvalidHistoryType {
        /// The value that was supplied.
        value: String,
    },
}

/// Errors raised by the time source.
#[derive(Error, Debug)]
pub enum ClockError {
    /// The clock has not been synchronized yet.
    #[error("time source unavailable: clock reads year {year}, expected at least {min_valid_year}")]
    TimeUnavailable {
        /// The year the clock currently reports.
        year: i32,
        /// The earliest year accepted as synchronized.
        min_valid_year: i32,
    },

    /// The configured UTC offset is out of range.
    #[error("invalid UTC offset: {seconds}s")]
    InvalidOffset {
        /// The offset in seconds east of UTC.
        seconds: i32,
    },
}

/// Errors raised by the partition store.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A directory or partition file could not be opened or created.
    #[error("storage unavailable at '{}': {source}", path.display())]
    Unavailable {
        /// The path that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Reading a partition failed part-way through.
    #[error("failed to read '{}': {source}", path.display())]
    ReadFailed {
        /// The partition file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Appending a line to a partition failed.
    #[error("failed to append to '{}': {source}", path.display())]
    WriteFailed {
        /// The partition file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Flushing an appended line to the medium failed.
    #[error("failed to sync '{}' to disk: {source}", path.display())]
    SyncFailed {
        /// The partition file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Returns the path the failing operation was working on.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Unavailable { path, .. }
            | Self::ReadFailed { path, .. }
            | Self::WriteFailed { path, .. }
            | Self::SyncFailed { path, .. } => path,
        }
    }
}

/// Errors raised while decoding a stored line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The line does not have the `timestamp, temperature, humidity` shape.
    #[error("malformed record '{line}': {reason}")]
    Malformed {
        /// The offending line, without its terminator.
        line: String,
        /// What was wrong with it.
        reason: &'static str,
    },
}

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config '{}': {source}", path.display())]
    Read {
        /// The config file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::config::CollectorConfig`].
    #[error("failed to parse config '{}': {source}", path.display())]
    Parse {
        /// The config file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A configuration value is out of range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Type alias for `Result<T, HygroError>`.
pub type Result<T> = std::result::Result<T, HygroError>;
