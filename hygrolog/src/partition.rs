//! Month-partitioned, append-only flat-file storage.
//!
//! Each sensor gets a directory under the data root and each calendar month
//! a text file inside it, one encoded reading per line:
//!
//! ```text
//! data_dir/
//! ├── Bedroom/
//! │   ├── 2024-06.txt
//! │   └── 2024-07.txt
//! └── Garage/
//!     └── 2024-07.txt
//! ```
//!
//! Files are only ever appended to. Every [`PartitionStore::append`] opens the
//! partition, writes one line, syncs it and closes the file again, so at most
//! the line in flight is lost if power goes away. Reads go through
//! [`PartitionReader`], a lazy line stream that holds one line in memory at a
//! time.

use std::cmp::Reverse;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Reading, Record};
use crate::error::{RequestError, Result, StorageError};

/// File extension of partition files.
const PARTITION_EXTENSION: &str = "txt";

/// Longest sensor name accepted, in bytes.
pub const MAX_SENSOR_NAME_LEN: usize = 64;

/// Longest stored line kept in memory, in bytes, terminator included.
///
/// Anything longer is not a reading (a run of zeros left by a power cut,
/// usually) and is discarded without being buffered.
pub const MAX_LINE_LEN: usize = 4 * 1024;

/// Partition key: one calendar month.
///
/// Ordering is chronological, which for the `YYYY-MM` rendering is also
/// lexicographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a key, or `None` if the month is not `1..=12` or the year does
    /// not fit in four digits.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        ((0..=9999).contains(&year) && (1..=12).contains(&month)).then_some(Self { year, month })
    }

    /// Returns the month containing `date`.
    pub fn of<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parses a strict `YYYY-MM` string.
    pub fn parse(s: &str) -> Option<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 7 || bytes[4] != b'-' {
            return None;
        }
        let (year, month) = (&s[..4], &s[5..]);
        if !year.bytes().chain(month.bytes()).all(|b| b.is_ascii_digit()) {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    /// Returns the year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month, `1..=12`.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Returns the partition file name, e.g. `2024-06.txt`.
    pub fn file_name(&self) -> String {
        format!("{self}.{PARTITION_EXTENSION}")
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Checks that `name` can be used as a sensor directory name.
///
/// # Errors
///
/// Returns [`RequestError::InvalidSensorName`] for empty or overlong names,
/// names starting with `.`, and names containing a path separator or NUL.
pub fn validate_sensor_name(name: &str) -> std::result::Result<(), RequestError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.len() > MAX_SENSOR_NAME_LEN {
        "name is longer than 64 bytes"
    } else if name.starts_with('.') {
        "name starts with '.'"
    } else if name.contains(['/', '\\', '\0']) {
        "name contains a path separator"
    } else {
        return Ok(());
    };

    Err(RequestError::InvalidSensorName {
        name: name.to_string(),
        reason,
    })
}

/// Handle on the data directory.
///
/// The store holds no open files. It is cheap to clone and every operation
/// opens and closes what it needs.
#[derive(Debug, Clone)]
pub struct PartitionStore {
    root: PathBuf,
}

impl PartitionStore {
    /// Opens the data directory, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the directory cannot be created.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StorageError::Unavailable {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Returns the data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory holding `sensor`'s partitions.
    pub fn sensor_dir(&self, sensor: &str) -> PathBuf {
        self.root.join(sensor)
    }

    /// Returns the file backing partition `(sensor, month)`.
    pub fn partition_path(&self, sensor: &str, month: YearMonth) -> PathBuf {
        self.sensor_dir(sensor).join(month.file_name())
    }

    /// Appends one reading to the partition for the reading's month.
    ///
    /// Creates the sensor directory and the partition file on first use. The
    /// line is synced to the medium before this returns.
    ///
    /// Returns the path of the partition written to.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Unavailable`] if the directory or file cannot be opened
    /// - [`StorageError::WriteFailed`] / [`StorageError::SyncFailed`] on I/O failure
    pub fn append(&self, sensor: &str, reading: &Reading) -> Result<PathBuf> {
        let dir = self.sensor_dir(sensor);
        fs::create_dir_all(&dir).map_err(|source| StorageError::Unavailable {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(YearMonth::of(&reading.timestamp).file_name());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StorageError::Unavailable {
                path: path.clone(),
                source,
            })?;

        let line = codec::encode(reading);
        if let Err(source) = file.write_all(line.as_bytes()) {
            return Err(StorageError::WriteFailed { path, source }.into());
        }
        if let Err(source) = file.sync_data() {
            return Err(StorageError::SyncFailed { path, source }.into());
        }

        tracing::debug!(sensor, path = %path.display(), "appended reading");
        Ok(path)
    }

    /// Opens partition `(sensor, month)` for sequential reading.
    ///
    /// Returns `Ok(None)` if the partition does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if the file exists but cannot be opened.
    pub fn open_partition(
        &self,
        sensor: &str,
        month: YearMonth,
    ) -> Result<Option<PartitionReader>> {
        let path = self.partition_path(sensor, month);
        match File::open(&path) {
            Ok(file) => Ok(Some(PartitionReader::new(path, file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Unavailable { path, source }.into()),
        }
    }

    /// Lists the partitions of `sensor`, newest month first.
    ///
    /// Only files named `YYYY-MM.txt` count; anything else in the sensor
    /// directory is ignored. A missing sensor directory yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory exists but cannot be listed.
    pub fn list_partitions(&self, sensor: &str) -> Result<Vec<YearMonth>> {
        let dir = self.sensor_dir(sensor);
        let Some(entries) = read_dir_if_exists(&dir)? else {
            return Ok(Vec::new());
        };

        let mut months = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::ReadFailed {
                path: dir.clone(),
                source,
            })?;
            if !entry.file_type().is_ok_and(|t| t.is_file()) {
                continue;
            }
            let file_name = entry.file_name();
            let month = file_name
                .to_str()
                .and_then(|name| name.strip_suffix(".txt"))
                .and_then(YearMonth::parse);
            if let Some(month) = month {
                months.push(month);
            }
        }

        months.sort_unstable_by_key(|m| Reverse(*m));
        Ok(months)
    }

    /// Lists the sensor directories under the data root, sorted by name.
    ///
    /// Entries whose names would be rejected by [`validate_sensor_name`] are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the data root cannot be listed.
    pub fn list_sensors(&self) -> Result<Vec<String>> {
        let Some(entries) = read_dir_if_exists(&self.root)? else {
            return Ok(Vec::new());
        };

        let mut sensors = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::ReadFailed {
                path: self.root.clone(),
                source,
            })?;
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string()
                && validate_sensor_name(&name).is_ok()
            {
                sensors.push(name);
            }
        }

        sensors.sort_unstable();
        Ok(sensors)
    }
}

/// Runs `read_dir`, mapping a missing directory to `None`.
fn read_dir_if_exists(dir: &Path) -> Result<Option<fs::ReadDir>> {
    match fs::read_dir(dir) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StorageError::Unavailable {
            path: dir.to_path_buf(),
            source,
        }
        .into()),
    }
}

/// Lazy stream of the records in one partition, in file order.
///
/// Lines that fail to decode (including non-UTF-8 lines and lines longer than
/// [`MAX_LINE_LEN`]) are skipped and logged at `debug`. An I/O error ends the
/// stream after being yielded once. The file is closed when the reader is
/// dropped.
#[derive(Debug)]
pub struct PartitionReader {
    path: PathBuf,
    reader: BufReader<File>,
    line: Vec<u8>,
    line_number: u64,
    done: bool,
}

/// Outcome of reading one line.
enum LineRead {
    /// `line` holds a whole line.
    Complete,
    /// The line was longer than [`MAX_LINE_LEN`]; its bytes were dropped.
    Oversized(usize),
    /// End of file, nothing read.
    Eof,
}

impl PartitionReader {
    fn new(path: PathBuf, file: File) -> Self {
        Self {
            path,
            reader: BufReader::new(file),
            line: Vec::with_capacity(64),
            line_number: 0,
            done: false,
        }
    }

    /// Returns the partition file being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads up to and including the next `\n` into `line`, keeping at most
    /// [`MAX_LINE_LEN`] bytes buffered.
    fn read_line(&mut self) -> io::Result<LineRead> {
        self.line.clear();
        let mut total = 0usize;
        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(match total {
                    0 => LineRead::Eof,
                    n if n > MAX_LINE_LEN => LineRead::Oversized(n),
                    _ => LineRead::Complete,
                });
            }

            let (used, found) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            let room = MAX_LINE_LEN.saturating_sub(self.line.len());
            self.line.extend_from_slice(&available[..used.min(room)]);
            total += used;
            self.reader.consume(used);

            if found {
                return Ok(if total > MAX_LINE_LEN {
                    LineRead::Oversized(total)
                } else {
                    LineRead::Complete
                });
            }
        }
    }
}

impl Iterator for PartitionReader {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.read_line() {
                Ok(LineRead::Eof) => self.done = true,
                Ok(LineRead::Oversized(len)) => {
                    self.line_number += 1;
                    tracing::debug!(
                        path = %self.path.display(),
                        line = self.line_number,
                        len,
                        "skipping oversized line"
                    );
                }
                Ok(LineRead::Complete) => {
                    self.line_number += 1;
                    let Ok(text) = std::str::from_utf8(&self.line) else {
                        tracing::debug!(
                            path = %self.path.display(),
                            line = self.line_number,
                            "skipping non-UTF-8 line"
                        );
                        continue;
                    };
                    match codec::decode(text) {
                        Ok(record) => return Some(Ok(record)),
                        Err(e) => tracing::debug!(
                            path = %self.path.display(),
                            line = self.line_number,
                            "skipping line: {e}"
                        ),
                    }
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(StorageError::ReadFailed {
                        path: self.path.clone(),
                        source,
                    }
                    .into()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    fn reading(ts: &str, temperature: f32, humidity: f32) -> Reading {
        Reading::new(
            NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).unwrap(),
            temperature,
            humidity,
        )
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_year_month_display_and_parse() {
        assert_eq!(ym(2024, 6).to_string(), "2024-06");
        assert_eq!(ym(2024, 6).file_name(), "2024-06.txt");
        assert_eq!(YearMonth::parse("2024-12"), Some(ym(2024, 12)));
        for bad in ["2024-6", "2024-13", "2024-00", "24-06", "2024_06", "2024-0a", "+024-06"] {
            assert_eq!(YearMonth::parse(bad), None, "{bad}");
        }
    }

    #[test]
    fn test_year_month_ordering() {
        assert!(ym(2023, 12) < ym(2024, 1));
        assert!(ym(2024, 2) < ym(2024, 10));
    }

    #[test]
    fn test_validate_sensor_name() {
        assert!(validate_sensor_name("Bedroom").is_ok());
        assert!(validate_sensor_name("Living Room 2").is_ok());
        for bad in ["", ".", "..", ".hidden", "a/b", "a\\b", "nul\0"] {
            assert!(validate_sensor_name(bad).is_err(), "{bad:?}");
        }
        assert!(validate_sensor_name(&"x".repeat(MAX_SENSOR_NAME_LEN)).is_ok());
        assert!(validate_sensor_name(&"x".repeat(MAX_SENSOR_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_append_creates_layout() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path().join("data")).unwrap();

        let path = store
            .append("Bedroom", &reading("2024-06-01 10:00:00", 21.5, 45.3))
            .unwrap();

        assert_eq!(path, temp_dir.path().join("data/Bedroom/2024-06.txt"));
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "2024-06-01 10:00:00, 21.50°C, 45.30%\n");
    }

    #[test]
    fn test_append_is_append_only() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();

        store.append("s", &reading("2024-06-01 10:00:00", 1.0, 2.0)).unwrap();
        store.append("s", &reading("2024-06-01 11:00:00", 1.0, 2.0)).unwrap();

        let lines: Vec<Record> = store
            .open_partition("s", ym(2024, 6))
            .unwrap()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].timestamp, "2024-06-01 10:00:00");
        assert_eq!(lines[1].timestamp, "2024-06-01 11:00:00");
    }

    #[test]
    fn test_open_missing_partition_is_none() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        assert!(store.open_partition("nobody", ym(2024, 6)).unwrap().is_none());
    }

    #[test]
    fn test_reader_skips_malformed_lines() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        fs::create_dir_all(store.sensor_dir("s")).unwrap();

        let mut bytes = b"2024-06-01 10:00:00, 1.00\xc2\xb0C, 2.00%\n".to_vec();
        bytes.extend_from_slice(b"garbage\n");
        bytes.extend_from_slice(b"\xff\xfe, 1, 2\n");
        bytes.extend_from_slice(b"\n");
        bytes.extend_from_slice(b"2024-06-02 10:00:00, 3.00\xc2\xb0C, 4.00%");
        fs::write(store.partition_path("s", ym(2024, 6)), bytes).unwrap();

        let records: Vec<Record> = store
            .open_partition("s", ym(2024, 6))
            .unwrap()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].temperature, "1.00°C");
        assert_eq!(records[1].timestamp, "2024-06-02 10:00:00");
    }

    #[test]
    fn test_reader_drops_oversized_lines() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        fs::create_dir_all(store.sensor_dir("s")).unwrap();

        // A power cut can leave megabytes of zeros with no terminator
        let mut bytes = b"2024-06-01 10:00:00, 1.00\xc2\xb0C, 2.00%\n".to_vec();
        bytes.extend(std::iter::repeat_n(0u8, 4 * 1024 * 1024));
        bytes.extend_from_slice(b"\n");
        bytes.extend_from_slice(b"2024-06-02 10:00:00, 3.00\xc2\xb0C, 4.00%\n");
        bytes.extend(std::iter::repeat_n(0u8, MAX_LINE_LEN + 1));
        fs::write(store.partition_path("s", ym(2024, 6)), bytes).unwrap();

        let mut reader = store.open_partition("s", ym(2024, 6)).unwrap().unwrap();
        let mut timestamps = Vec::new();
        for record in reader.by_ref() {
            timestamps.push(record.unwrap().timestamp);
        }

        assert_eq!(timestamps, ["2024-06-01 10:00:00", "2024-06-02 10:00:00"]);
        assert!(reader.line.capacity() <= 2 * MAX_LINE_LEN);
    }

    #[test]
    fn test_reader_keeps_line_at_limit() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        fs::create_dir_all(store.sensor_dir("s")).unwrap();

        let prefix = "2024-06-01 10:00:00, 1.00°C, ";
        let padding = MAX_LINE_LEN - prefix.len() - 1;
        let line = format!("{prefix}{}\n", "9".repeat(padding));
        assert_eq!(line.len(), MAX_LINE_LEN);
        fs::write(store.partition_path("s", ym(2024, 6)), &line).unwrap();

        let records: Vec<Record> = store
            .open_partition("s", ym(2024, 6))
            .unwrap()
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].humidity.len(), padding);
    }

    #[test]
    fn test_list_partitions_newest_first() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();

        for ts in ["2023-12-31 23:00:00", "2024-07-01 00:00:00", "2024-06-15 12:00:00"] {
            store.append("s", &reading(ts, 1.0, 2.0)).unwrap();
        }
        fs::write(store.sensor_dir("s").join("notes.txt"), "x").unwrap();
        fs::write(store.sensor_dir("s").join("2024-05.csv"), "x").unwrap();
        fs::create_dir(store.sensor_dir("s").join("2024-04.txt")).unwrap();

        assert_eq!(
            store.list_partitions("s").unwrap(),
            vec![ym(2024, 7), ym(2024, 6), ym(2023, 12)]
        );
    }

    #[test]
    fn test_list_partitions_missing_sensor_is_empty() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();
        assert!(store.list_partitions("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_list_sensors_sorted() {
        let temp_dir = tempdir().unwrap();
        let store = PartitionStore::open(temp_dir.path()).unwrap();

        store.append("Kitchen", &reading("2024-06-01 10:00:00", 1.0, 2.0)).unwrap();
        store.append("Bedroom", &reading("2024-06-01 10:00:00", 1.0, 2.0)).unwrap();
        fs::create_dir(temp_dir.path().join(".trash")).unwrap();
        fs::write(temp_dir.path().join("stray.txt"), "x").unwrap();

        assert_eq!(store.list_sensors().unwrap(), vec!["Bedroom", "Kitchen"]);
    }
}
