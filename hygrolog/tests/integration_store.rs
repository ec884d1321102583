//! Integration tests for the full collector lifecycle.
//!
//! These tests exercise the complete flow from ingest through the on-disk
//! layout to every query mode, including restart behavior.

use std::fs;

use chrono::NaiveDateTime;
use hygrolog::codec::TIMESTAMP_FORMAT;
use hygrolog::{Collector, FixedClock, HistoryMode, Record, Submission};
use tempfile::tempdir;

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).unwrap()
}

fn submission(name: &str, temperature: &str, humidity: &str) -> Submission {
    Submission::from_pairs([
        ("name", name),
        ("temperature", temperature),
        ("humidity", humidity),
    ])
}

fn collect(collector: &Collector<FixedClock>, sensor: &str, mode: HistoryMode) -> Vec<Record> {
    collector
        .history(sensor, mode)
        .unwrap()
        .collect::<hygrolog::Result<_>>()
        .unwrap()
}

#[test]
fn test_bedroom_scenario() {
    let temp_dir = tempdir().unwrap();
    let data_dir = temp_dir.path().join("sd");
    let clock = FixedClock::new(at("2024-06-01 10:00:00"));
    let mut collector = Collector::open(&data_dir, clock).unwrap();

    collector.ingest(&submission("Bedroom", "21.50", "45.30")).unwrap();

    // Phase 1: on-disk layout
    let partition = data_dir.join("Bedroom").join("2024-06.txt");
    assert_eq!(
        fs::read_to_string(&partition).unwrap(),
        "2024-06-01 10:00:00, 21.50°C, 45.30%\n"
    );

    // Phase 2: every query mode sees the reading
    let expected = Record {
        timestamp: "2024-06-01 10:00:00".to_string(),
        temperature: "21.50°C".to_string(),
        humidity: "45.30%".to_string(),
    };
    assert_eq!(collector.latest("Bedroom").unwrap(), Some(expected.clone()));
    assert_eq!(collect(&collector, "Bedroom", HistoryMode::Day), [expected.clone()]);
    assert_eq!(collect(&collector, "Bedroom", HistoryMode::Month), [expected.clone()]);
    assert_eq!(collect(&collector, "Bedroom", HistoryMode::All), [expected]);
    assert_eq!(collector.sensors(), ["Bedroom"]);
}

#[test]
fn test_latest_matches_ingested_values() {
    let temp_dir = tempdir().unwrap();
    let mut collector =
        Collector::open(temp_dir.path(), FixedClock::new(at("2024-02-29 06:07:08"))).unwrap();

    for (t, h, t_text, h_text) in [
        ("-12.345", "99.999", "-12.35°C", "100.00%"),
        ("0", "0", "0.00°C", "0.00%"),
        ("37.8", "12.5", "37.80°C", "12.50%"),
    ] {
        collector.ingest(&submission("Porch", t, h)).unwrap();
        let latest = collector.latest("Porch").unwrap().unwrap();
        assert_eq!(latest.timestamp, "2024-02-29 06:07:08");
        assert_eq!(latest.temperature, t_text);
        assert_eq!(latest.humidity, h_text);
    }
}

#[test]
fn test_month_round_trip_and_isolation() {
    let temp_dir = tempdir().unwrap();
    let mut collector =
        Collector::open(temp_dir.path(), FixedClock::new(at("2024-05-20 08:00:00"))).unwrap();

    collector.ingest(&submission("Cellar", "12", "80")).unwrap();
    collector.clock().set(at("2024-06-02 08:00:00"));
    collector.ingest(&submission("Cellar", "13", "81")).unwrap();

    let june = collect(&collector, "Cellar", HistoryMode::Month);
    assert_eq!(june.len(), 1);
    assert_eq!(june[0].timestamp, "2024-06-02 08:00:00");

    collector.clock().set(at("2024-05-31 23:59:59"));
    let may = collect(&collector, "Cellar", HistoryMode::Month);
    assert_eq!(may.len(), 1);
    assert_eq!(may[0].timestamp, "2024-05-20 08:00:00");

    let all = collect(&collector, "Cellar", HistoryMode::All);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].timestamp, "2024-06-02 08:00:00");
}

#[test]
fn test_restart_rebuilds_registry_and_keeps_data() {
    let temp_dir = tempdir().unwrap();

    {
        let mut collector =
            Collector::open(temp_dir.path(), FixedClock::new(at("2024-06-01 10:00:00"))).unwrap();
        collector.ingest(&submission("Garage", "5", "70")).unwrap();
        collector.ingest(&submission("Attic", "30", "20")).unwrap();
    }

    let mut collector =
        Collector::open(temp_dir.path(), FixedClock::new(at("2024-06-01 11:00:00"))).unwrap();
    assert_eq!(collector.sensors(), ["Attic", "Garage"]);

    let outcome = collector.ingest(&submission("Garage", "6", "71")).unwrap();
    assert!(!outcome.new_sensor);
    assert_eq!(collect(&collector, "Garage", HistoryMode::Day).len(), 2);
}

#[test]
fn test_invalid_sentinel_is_stored() {
    let temp_dir = tempdir().unwrap();
    let mut collector =
        Collector::open(temp_dir.path(), FixedClock::new(at("2024-06-01 10:00:00"))).unwrap();

    collector.ingest(&submission("Bedroom", "nan", "nan")).unwrap();
    let latest = collector.latest("Bedroom").unwrap().unwrap();
    assert_eq!(latest.temperature, "NaN°C");
    assert_eq!(latest.humidity, "NaN%");
}
