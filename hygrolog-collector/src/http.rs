//! Minimal HTTP server for the collector.
//!
//! Uses `std::net::TcpListener` — no external HTTP framework needed. One
//! connection is accepted, answered and closed before the next is accepted,
//! which keeps partition writes serialized without any locking.
//!
//! Endpoints:
//!
//! - `GET /receiveData?name=&temperature=&humidity=` — store one reading
//! - `GET /sensor?name=` — latest reading page
//! - `GET /sensorHistory?name=&type=D|M|A` — history table page
//! - `GET /` — sensor selection page

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use hygrolog::{Clock, Collector, CollectorConfig, HistoryMode, HygroError, Submission};
use url::form_urlencoded;

use crate::pages;

type HandlerResult = Result<(), Box<dyn std::error::Error>>;

const HTML: &str = "text/html; charset=UTF-8";
const TEXT: &str = "text/plain; charset=UTF-8";

/// Longest request or header line accepted, in bytes.
const MAX_LINE_LEN: u64 = 8 * 1024;

/// Runs the HTTP server until the listener fails.
///
/// # Errors
///
/// Returns an error if the listen address cannot be bound.
pub fn run_server<C: Clock>(
    collector: &mut Collector<C>,
    config: &CollectorConfig,
) -> std::io::Result<()> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)?;
    tracing::info!("collector listening on {addr}");

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("accept error: {e}");
                continue;
            }
        };

        // A client that stops reading a streamed page must not hold the loop
        if let Err(e) = configure_stream(&stream, config.request_timeout()) {
            tracing::warn!("failed to set socket timeouts: {e}");
        }

        if let Err(e) = handle_connection(&stream, &stream, collector) {
            tracing::debug!("request error: {e}");
        }
    }

    Ok(())
}

/// Applies the per-connection read and write timeouts.
fn configure_stream(stream: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

/// Parses one HTTP request from `input` and writes the response to `output`.
///
/// # Errors
///
/// Returns an error if reading the request or writing the response fails.
pub fn handle_connection<R: Read, W: Write, C: Clock>(
    input: R,
    output: W,
    collector: &mut Collector<C>,
) -> HandlerResult {
    let mut reader = BufReader::new(input);
    let mut output = BufWriter::new(output);

    let mut request_line = String::new();
    if read_line(&mut reader, &mut request_line)? == 0 {
        return Ok(());
    }

    // Parse: "GET /path?query HTTP/1.x"
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        send_response(&mut output, 400, TEXT, "Bad Request")?;
        return Ok(output.flush()?);
    }
    let method = parts[0];

    let (path, query) = match parts[1].split_once('?') {
        Some((p, q)) => (p, q),
        None => (parts[1], ""),
    };

    // Drain remaining headers (we don't need them)
    loop {
        let mut line = String::new();
        if read_line(&mut reader, &mut line)? == 0 || line.trim().is_empty() {
            break;
        }
    }

    let params = Params::parse(query);
    tracing::debug!(method, path, "request");

    match (method, path) {
        ("GET", "/receiveData") => handle_receive(&mut output, collector, &params)?,
        ("GET", "/sensor") => handle_sensor(&mut output, collector, &params)?,
        ("GET", "/sensorHistory") => handle_history(&mut output, collector, &params)?,
        ("GET", "/") => handle_root(&mut output, collector)?,
        (_, "/receiveData" | "/sensor" | "/sensorHistory" | "/") => {
            send_response(&mut output, 405, TEXT, "Method Not Allowed")?;
        }
        _ => send_response(&mut output, 404, TEXT, "Not Found")?,
    }

    Ok(output.flush()?)
}

/// `GET /receiveData` — validates and stores one reading.
fn handle_receive<C: Clock>(
    w: &mut impl Write,
    collector: &mut Collector<C>,
    params: &Params,
) -> HandlerResult {
    let submission = Submission::from_pairs(params.pairs.iter().map(|(k, v)| (k, v.as_str())));

    match collector.ingest(&submission) {
        Ok(_) => send_response(w, 200, TEXT, "Data stored"),
        Err(e) if e.is_client_error() => send_response(w, 400, TEXT, &e.to_string()),
        Err(e) => {
            tracing::error!("failed to store reading: {e}");
            send_response(w, 500, TEXT, &e.to_string())
        }
    }
}

/// `GET /sensor` — renders the latest reading of one sensor.
fn handle_sensor<C: Clock>(
    w: &mut impl Write,
    collector: &Collector<C>,
    params: &Params,
) -> HandlerResult {
    let Some(name) = params.get("name") else {
        return send_response(w, 400, TEXT, "missing parameter 'name'");
    };

    let latest = match collector.latest(name) {
        Err(e) if e.is_client_error() => return send_response(w, 400, TEXT, &e.to_string()),
        other => other,
    };
    if let Err(e) = &latest {
        tracing::warn!(sensor = name, "latest query failed: {e}");
    }

    let mut body = Vec::new();
    pages::latest(&mut body, name, latest.as_ref().map(Option::as_ref))?;
    send_bytes(w, 200, HTML, &body)
}

/// `GET /sensorHistory` — streams a table of readings for one sensor.
fn handle_history<C: Clock>(
    w: &mut impl Write,
    collector: &Collector<C>,
    params: &Params,
) -> HandlerResult {
    let Some(name) = params.get("name") else {
        return send_response(w, 400, TEXT, "missing parameter 'name'");
    };
    let Some(kind) = params.get("type") else {
        return send_response(w, 400, TEXT, "missing parameter 'type'");
    };
    let mode: HistoryMode = match kind.parse() {
        Ok(mode) => mode,
        Err(e) => return send_response(w, 400, TEXT, &HygroError::from(e).to_string()),
    };

    match collector.history(name, mode) {
        Ok(history) => {
            start_stream(w, 200, HTML)?;
            let rows = pages::history(w, name, mode, history)?;
            tracing::debug!(sensor = name, %mode, rows, "history served");
            Ok(())
        }
        Err(e) if e.is_client_error() => send_response(w, 400, TEXT, &e.to_string()),
        Err(e) => {
            tracing::warn!(sensor = name, %mode, "history query failed: {e}");
            let mut body = Vec::new();
            pages::history_error(&mut body, name, mode, &e)?;
            send_bytes(w, 200, HTML, &body)
        }
    }
}

/// `GET /` — renders the sensor selection page.
fn handle_root<C: Clock>(w: &mut impl Write, collector: &Collector<C>) -> HandlerResult {
    let mut body = Vec::new();
    pages::index(&mut body, collector.sensors())?;
    send_bytes(w, 200, HTML, &body)
}

/// Decoded query string. Lookups return the first occurrence of a key.
#[derive(Debug, Default)]
struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    fn parse(query: &str) -> Self {
        Self {
            pairs: form_urlencoded::parse(query.as_bytes()).into_owned().collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Reads one line, refusing lines longer than [`MAX_LINE_LEN`].
fn read_line<R: BufRead>(reader: &mut R, buf: &mut String) -> std::io::Result<usize> {
    let n = reader.by_ref().take(MAX_LINE_LEN).read_line(buf)?;
    if n as u64 == MAX_LINE_LEN && !buf.ends_with('\n') {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "request line too long",
        ));
    }
    Ok(n)
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

/// Sends a plain-text HTTP response.
fn send_response(w: &mut impl Write, status: u16, content_type: &str, body: &str) -> HandlerResult {
    send_bytes(w, status, content_type, body.as_bytes())
}

/// Sends a complete HTTP response with a known length.
fn send_bytes(w: &mut impl Write, status: u16, content_type: &str, body: &[u8]) -> HandlerResult {
    write!(
        w,
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: {content_type}\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n",
        status_text(status),
        body.len(),
    )?;
    w.write_all(body)?;
    Ok(())
}

/// Starts a response whose body is delimited by closing the connection.
fn start_stream(w: &mut impl Write, status: u16, content_type: &str) -> HandlerResult {
    write!(
        w,
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: {content_type}\r\n\
         Connection: close\r\n\
         \r\n",
        status_text(status),
    )?;
    Ok(())
}
