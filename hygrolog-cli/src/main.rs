//! CLI for hygrolog data directories.
//!
//! Provides commands for inspecting and querying a collector's partition tree
//! offline, and for pushing a single reading to a running collector.

use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::{Parser, Subcommand, ValueEnum};
use hygrolog::codec::TIMESTAMP_FORMAT;
use hygrolog::partition::validate_sensor_name;
use hygrolog::{Clock, Collector, FixedClock, HistoryMode, PartitionStore, Record, SystemClock};

/// hygrolog — Inspect, query and feed temperature/humidity logs.
#[derive(Parser)]
#[command(name = "hygrolog", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Display sensors, partitions, line counts and disk usage.
    Info {
        /// Path to the data directory.
        data_dir: PathBuf,
    },

    /// Query readings of one sensor.
    Query {
        /// Path to the data directory.
        data_dir: PathBuf,

        /// Sensor name to query.
        sensor: String,

        /// Which readings to return.
        #[arg(long, default_value = "latest")]
        mode: QueryMode,

        /// Evaluate "current day/month" at this local time instead of now
        /// (format: "YYYY-MM-DD HH:MM:SS").
        #[arg(long)]
        at: Option<String>,

        /// Output format.
        #[arg(long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Send one reading to a running collector.
    Push {
        /// Collector address, e.g. "192.168.1.10" or "http://collector:8080".
        collector: String,

        /// Sensor name.
        #[arg(long)]
        name: String,

        /// Temperature in °C (sent verbatim; "nan" marks an invalid reading).
        #[arg(long, allow_negative_numbers = true)]
        temperature: String,

        /// Relative humidity in % (sent verbatim).
        #[arg(long)]
        humidity: String,

        /// Request timeout in seconds.
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

/// Query selection.
#[derive(Clone, Copy, ValueEnum)]
enum QueryMode {
    /// Most recent reading of the current month.
    Latest,
    /// Readings of the current day.
    Day,
    /// Readings of the current month.
    Month,
    /// Full history, newest month first.
    All,
}

/// Output format for query results.
#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object with a `data` array.
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Info { data_dir } => cmd_info(&data_dir),
        Commands::Query {
            data_dir,
            sensor,
            mode,
            at,
            format,
        } => cmd_query(&data_dir, &sensor, mode, at.as_deref(), &format),
        Commands::Push {
            collector,
            name,
            temperature,
            humidity,
            timeout,
        } => cmd_push(&collector, &name, &temperature, &humidity, timeout),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Implements `hygrolog info <data_dir>`.
fn cmd_info(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !data_dir.is_dir() {
        return Err(format!("No data directory at '{}'", data_dir.display()).into());
    }
    let store = PartitionStore::open(data_dir)?;
    let sensors = store.list_sensors()?;

    println!("Data directory: {}", data_dir.display());
    println!("Sensors: {}", sensors.len());
    println!();

    let mut total_lines = 0;
    for sensor in &sensors {
        let partitions = store.list_partitions(sensor)?;
        println!("  {sensor}: {} partition(s)", partitions.len());
        for month in partitions {
            let path = store.partition_path(sensor, month);
            let (lines, bytes) = count_lines(&path)?;
            total_lines += lines;
            println!("    {month}: {lines} line(s), {}", format_bytes(bytes));
        }
    }

    let total_size = dir_size(data_dir)?;
    println!();
    println!("Total readings: {total_lines}");
    println!("Total disk usage: {} ({total_size} bytes)", format_bytes(total_size));

    Ok(())
}

/// Implements `hygrolog query <data_dir> <sensor>`.
fn cmd_query(
    data_dir: &Path,
    sensor: &str,
    mode: QueryMode,
    at: Option<&str>,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    if !data_dir.is_dir() {
        return Err(format!("No data directory at '{}'", data_dir.display()).into());
    }
    validate_sensor_name(sensor)?;

    let clock: Box<dyn Clock> = match at {
        Some(text) => Box::new(FixedClock::new(parse_at(text)?)),
        None => Box::new(SystemClock::local()),
    };
    let collector = Collector::open(data_dir, clock.as_ref())?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let result = match mode {
        QueryMode::Latest => {
            let latest = collector.latest(sensor)?;
            write_records(&mut out, sensor, mode, latest.into_iter().map(Ok), format)
        }
        QueryMode::Day => {
            let rows = collector.history(sensor, HistoryMode::Day)?;
            write_records(&mut out, sensor, mode, rows, format)
        }
        QueryMode::Month => {
            let rows = collector.history(sensor, HistoryMode::Month)?;
            write_records(&mut out, sensor, mode, rows, format)
        }
        QueryMode::All => {
            let rows = collector.history(sensor, HistoryMode::All)?;
            write_records(&mut out, sensor, mode, rows, format)
        }
    };
    // Rows printed before a mid-scan failure still reach stdout
    out.flush()?;
    result.map(|_| ())
}

fn parse_at(text: &str) -> Result<NaiveDateTime, Box<dyn std::error::Error>> {
    NaiveDateTime::parse_from_str(text.trim(), TIMESTAMP_FORMAT)
        .map_err(|e| format!("invalid --at '{text}': {e} (expected YYYY-MM-DD HH:MM:SS)").into())
}

fn mode_name(mode: QueryMode) -> &'static str {
    match mode {
        QueryMode::Latest => "latest",
        QueryMode::Day => "day",
        QueryMode::Month => "month",
        QueryMode::All => "all",
    }
}

/// Writes query results to `w` as `rows` yields them.
///
/// The row count goes last (a trailing comment in CSV, the final key in
/// JSON) so nothing has to be buffered. Returns the number of rows written.
///
/// # Errors
///
/// Returns the first storage error from `rows`, after the rows before it
/// have been written, or any write error.
fn write_records<W, I>(
    w: &mut W,
    sensor: &str,
    mode: QueryMode,
    rows: I,
    format: &OutputFormat,
) -> Result<usize, Box<dyn std::error::Error>>
where
    W: Write,
    I: IntoIterator<Item = hygrolog::Result<Record>>,
{
    let mut count = 0;
    match format {
        OutputFormat::Csv => {
            writeln!(w, "# sensor={sensor}, mode={}", mode_name(mode))?;
            writeln!(w, "timestamp,temperature,humidity")?;
            for row in rows {
                let r = row?;
                writeln!(w, "{},{},{}", r.timestamp, r.temperature, r.humidity)?;
                count += 1;
            }
            writeln!(w, "# readings={count}")?;
        }
        OutputFormat::Json => {
            write!(w, "{{\n  \"sensor\": ")?;
            serde_json::to_writer(&mut *w, sensor)?;
            write!(w, ",\n  \"mode\": \"{}\",\n  \"data\": [", mode_name(mode))?;
            for row in rows {
                let r = row?;
                if count > 0 {
                    w.write_all(b",")?;
                }
                w.write_all(b"\n    ")?;
                serde_json::to_writer(&mut *w, &r)?;
                count += 1;
            }
            if count > 0 {
                w.write_all(b"\n  ")?;
            }
            writeln!(w, "],\n  \"count\": {count}\n}}")?;
        }
    }
    Ok(count)
}

/// Implements `hygrolog push <collector>`.
///
/// Sends exactly one request; a failed delivery is reported, not retried.
fn cmd_push(
    collector: &str,
    name: &str,
    temperature: &str,
    humidity: &str,
    timeout: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let url = receive_url(collector);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout))
        .build()?;

    let response = client
        .get(&url)
        .query(&[
            ("name", name),
            ("temperature", temperature),
            ("humidity", humidity),
        ])
        .send()?;

    let status = response.status();
    let body = response
        .text()
        .map_err(|e| format!("collector answered {status}, body unreadable: {e}"))?;
    if !status.is_success() {
        return Err(format!("collector answered {status}: {}", body.trim()).into());
    }

    println!("{status}: {}", body.trim());
    Ok(())
}

/// Builds the ingest endpoint URL from a bare host or a base URL.
fn receive_url(collector: &str) -> String {
    let base = collector.trim().trim_end_matches('/');
    if base.contains("://") {
        format!("{base}/receiveData")
    } else {
        format!("http://{base}/receiveData")
    }
}

/// Counts newline-terminated lines and bytes in a partition file.
fn count_lines(path: &Path) -> Result<(u64, u64), Box<dyn std::error::Error>> {
    let mut file = std::fs::File::open(path)?;
    let mut buf = [0u8; 8192];
    let (mut lines, mut bytes) = (0u64, 0u64);
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        bytes += n as u64;
        lines += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    Ok((lines, bytes))
}

/// Formats a byte count as a human-readable string.
#[allow(clippy::cast_precision_loss)] // Byte counts are display-only
fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Recursively calculates directory size.
fn dir_size(path: &Path) -> Result<u64, Box<dyn std::error::Error>> {
    let mut total = 0;
    if path.is_dir() {
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }
    Ok(total)
}
