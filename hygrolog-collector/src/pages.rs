//! HTML rendering for the collector's pages.
//!
//! Pages are written straight into any `io::Write`. History tables are
//! emitted row by row as the query iterator yields them, so the size of a
//! sensor's history never shows up in memory.

use std::io::{self, Write};

use hygrolog::{HistoryMode, HygroError, Record};
use url::form_urlencoded;

const TABLE_HEADER: &str =
    "<table border='1'><tr><th>Timestamp</th><th>Temperature (°C)</th><th>Humidity (%)</th></tr>\n";

/// Escapes HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Percent-encodes a query parameter value.
fn query_value(s: &str) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn page_start(w: &mut impl Write, title: &str) -> io::Result<()> {
    write!(
        w,
        "<!DOCTYPE html>\n<html><head><meta charset=\"UTF-8\"><title>{}</title></head>\n\
         <body style='background-color:#fffbe6; color:black; font-family:sans-serif;'>\n\
         <h1>{}</h1>\n",
        html_escape(title),
        html_escape(title)
    )
}

fn page_end(w: &mut impl Write) -> io::Result<()> {
    w.write_all(b"</body></html>\n")
}

fn link_button(w: &mut impl Write, href: &str, label: &str) -> io::Result<()> {
    writeln!(
        w,
        "<p><a href=\"{}\"><button>{}</button></a></p>",
        html_escape(href),
        html_escape(label)
    )
}

fn storage_error(w: &mut impl Write, err: &HygroError) -> io::Result<()> {
    writeln!(w, "<p>[ERROR] {}</p>", html_escape(&err.to_string()))
}

/// Renders the sensor selection page.
pub fn index(w: &mut impl Write, sensors: &[String]) -> io::Result<()> {
    page_start(w, "Sensors")?;
    if sensors.is_empty() {
        w.write_all(b"<p>[INFO] No sensors have reported yet.</p>\n")?;
    } else {
        w.write_all(b"<ul>\n")?;
        for name in sensors {
            writeln!(
                w,
                "<li><a href=\"/sensor?name={}\">{}</a></li>",
                query_value(name),
                html_escape(name)
            )?;
        }
        w.write_all(b"</ul>\n")?;
    }
    page_end(w)
}

/// Renders the latest-reading page for `sensor`.
///
/// A storage error is shown inline rather than failing the page.
pub fn latest(
    w: &mut impl Write,
    sensor: &str,
    latest: std::result::Result<Option<&Record>, &HygroError>,
) -> io::Result<()> {
    page_start(w, &format!("Latest readings for sensor: {sensor}"))?;

    match latest {
        Ok(Some(record)) => {
            writeln!(w, "<p>Timestamp: {}</p>", html_escape(&record.timestamp))?;
            writeln!(w, "<p>Temperature: {}</p>", html_escape(&record.temperature))?;
            writeln!(w, "<p>Humidity: {}</p>", html_escape(&record.humidity))?;
        }
        Ok(None) => w.write_all(b"<p>[INFO] No data available.</p>\n")?,
        Err(err) => storage_error(w, err)?,
    }

    let name = query_value(sensor);
    for mode in [HistoryMode::Day, HistoryMode::Month, HistoryMode::All] {
        link_button(
            w,
            &format!("/sensorHistory?name={name}&type={}", mode.code()),
            mode.label(),
        )?;
    }
    link_button(w, "/", "Back")?;
    page_end(w)
}

/// Renders a history page whose query could not be started.
pub fn history_error(
    w: &mut impl Write,
    sensor: &str,
    mode: HistoryMode,
    err: &HygroError,
) -> io::Result<()> {
    history_start(w, sensor, mode)?;
    storage_error(w, err)?;
    history_end(w, sensor)
}

/// Renders a history page, streaming `rows` into the table.
///
/// Returns the number of rows written.
pub fn history<I>(w: &mut impl Write, sensor: &str, mode: HistoryMode, rows: I) -> io::Result<usize>
where
    I: IntoIterator<Item = hygrolog::Result<Record>>,
{
    history_start(w, sensor, mode)?;

    let mut written = 0;
    let mut table_open = false;
    for row in rows {
        match row {
            Ok(record) => {
                if !table_open {
                    w.write_all(TABLE_HEADER.as_bytes())?;
                    table_open = true;
                }
                writeln!(
                    w,
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                    html_escape(&record.timestamp),
                    html_escape(&record.temperature),
                    html_escape(&record.humidity)
                )?;
                written += 1;
            }
            Err(err) => {
                if table_open {
                    w.write_all(b"</table>\n")?;
                    table_open = false;
                }
                storage_error(w, &err)?;
            }
        }
    }

    if table_open {
        w.write_all(b"</table>\n")?;
    }
    if written == 0 {
        w.write_all(b"<p>[INFO] No data found.</p>\n")?;
    }

    history_end(w, sensor)?;
    Ok(written)
}

fn history_start(w: &mut impl Write, sensor: &str, mode: HistoryMode) -> io::Result<()> {
    page_start(w, &format!("History for sensor: {sensor} ({})", mode.label()))
}

fn history_end(w: &mut impl Write, sensor: &str) -> io::Result<()> {
    link_button(w, &format!("/sensor?name={}", query_value(sensor)), "Back")?;
    page_end(w)
}
