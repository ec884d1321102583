//! hygrolog collector node.
//!
//! Receives readings from battery-powered sensor nodes over HTTP, appends them
//! to month partitions under the data directory, and serves the stored
//! readings back as simple HTML pages.

mod http;
mod pages;

use std::path::PathBuf;

use clap::Parser;
use hygrolog::{Collector, CollectorConfig};
use tracing_subscriber::EnvFilter;

/// hygrolog-collector — Sensor reading collector with an HTML front end.
#[derive(Parser)]
#[command(name = "hygrolog-collector", version, about)]
struct Cli {
    /// Path to a JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory of the partition tree.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Address to bind the HTTP server to.
    #[arg(long)]
    bind: Option<String>,

    /// Port for the HTTP server.
    #[arg(long)]
    port: Option<u16>,

    /// Fixed UTC offset in seconds used to stamp readings (host zone if unset).
    #[arg(long, allow_negative_numbers = true)]
    utc_offset: Option<i32>,
}

impl Cli {
    /// Loads the configuration file, if any, and applies flag overrides.
    fn into_config(self) -> hygrolog::Result<CollectorConfig> {
        let mut config = match &self.config {
            Some(path) => CollectorConfig::load(path)?,
            None => CollectorConfig::default(),
        };
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(offset) = self.utc_offset {
            config.clock.utc_offset_secs = Some(offset);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("collector failed: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = cli.into_config()?;

    let mut collector = Collector::from_config(&config)?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        sensors = collector.sensors().len(),
        "storage ready"
    );

    // Log the clock state up front; readings are refused until it is valid
    match collector.now() {
        Ok(now) => tracing::info!("clock reads {now}"),
        Err(e) => tracing::warn!("{e}"),
    }

    http::run_server(&mut collector, &config)?;
    Ok(())
}
