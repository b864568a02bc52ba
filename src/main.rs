//! CLI entry point for the guaguas live-bus tracker.
//!
//! `watch` polls the live feed and logs updates for the subscribed lines;
//! `snapshot` decodes a single batch from a file or URL.

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use guaguas_rt::config::{PollerConfig, interval_from_millis};
use guaguas_rt::{
    BusRecord, BusTracker, Poller, SharedTracker,
    fetch::{BasicClient, CacheBust, fetch_bytes},
    output::{append_records, print_json, print_pretty},
    parser::parse_batch,
};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "guaguas_rt")]
#[command(about = "Track live bus positions from the guaguas feed", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the live feed and report updates
    Watch {
        /// Comma-separated line numbers to follow (e.g. "7,L1,L2")
        #[arg(short, long, value_delimiter = ',')]
        lines: Vec<String>,

        /// Poll interval in milliseconds (overrides GUAGUAS_POLL_INTERVAL_MS)
        #[arg(short, long)]
        interval_ms: Option<u64>,

        /// Feed URL (overrides GUAGUAS_URL)
        #[arg(long)]
        url: Option<String>,

        /// Log every bus merge
        #[arg(short, long, default_value_t = false)]
        debug: bool,

        /// CSV file to append every polled batch to
        #[arg(long)]
        csv: Option<String>,

        /// Run a single cycle and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Decode one batch from a file or URL and print it as JSON
    Snapshot {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// CSV file to append the decoded records to
        #[arg(long)]
        csv: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/guaguas_rt.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("guaguas_rt.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            lines,
            interval_ms,
            url,
            debug,
            csv,
            once,
        } => {
            let mut config = PollerConfig::from_env()?;
            if let Some(ms) = interval_ms {
                config.interval = interval_from_millis(ms)?;
            }
            if let Some(url) = url {
                config.base_url = url;
            }
            config.debug |= debug;

            watch(config, lines, csv, once).await?;
        }
        Commands::Snapshot { source, csv } => {
            snapshot(&source, csv.as_deref()).await?;
        }
    }

    Ok(())
}

/// Subscribes loggers for `lines` and polls until Ctrl+C (or one cycle with
/// `once`).
#[tracing::instrument(skip_all, fields(url = %config.base_url, lines = %lines.join(",")))]
async fn watch(config: PollerConfig, lines: Vec<String>, csv: Option<String>, once: bool) -> Result<()> {
    let tracker: SharedTracker = Arc::new(Mutex::new(BusTracker::new()));

    {
        let mut tracker = tracker
            .lock()
            .map_err(|_| anyhow!("bus tracker lock poisoned"))?;
        let subscriptions = tracker.subscriptions_mut();

        if !lines.is_empty() {
            subscriptions.subscribe_lines(lines.iter(), |bus: &BusRecord| {
                info!(
                    bus_id = %bus.id,
                    line = %bus.line_number,
                    stop = %bus.stop_name,
                    route = %bus.route_name,
                    lat = bus.position.lat,
                    lng = bus.position.lng,
                    "Subscribed bus updated"
                );
            });
        }

        subscriptions.subscribe_global(move |batch: &[BusRecord]| {
            info!(buses = batch.len(), "All buses updated");
            if let Some(path) = &csv {
                if let Err(e) = append_records(path, batch) {
                    error!(path = %path, error = %e, "Failed to append CSV records");
                }
            }
        });
    }

    let poller = Poller::from_config(&config, Arc::clone(&tracker))?;

    if once {
        poller.run_cycle().await?;
        return Ok(());
    }

    let handle = poller.start(config.interval);
    tokio::signal::ctrl_c().await?;
    info!("Ctrl+C received, stopping");
    handle.stop();
    handle.join().await?;

    let tracked = tracker
        .lock()
        .map_err(|_| anyhow!("bus tracker lock poisoned"))?
        .registry()
        .len();
    info!(tracked, "Finished polling");
    Ok(())
}

/// Decodes one batch from a local file or a URL and prints every record.
#[tracing::instrument(skip(csv))]
async fn snapshot(source: &str, csv: Option<&str>) -> Result<()> {
    let bytes = fetcher(source).await?;
    let raw = parse_batch(&bytes)?;

    let mut tracker = BusTracker::new();
    let report = tracker.process_batch(&raw);
    let mut buses = tracker.buses();
    buses.sort_by(|a, b| a.id.cmp(&b.id));

    for bus in &buses {
        print_pretty(bus);
    }
    print_json(&buses)?;
    if let Some(path) = csv {
        append_records(path, &buses)?;
    }

    info!(
        records = report.records,
        buses = buses.len(),
        fallbacks = report.fallbacks,
        "Snapshot decoded"
    );
    Ok(())
}

/// Loads feed data from a local file path or fetches it over HTTP.
async fn fetcher(source: &str) -> Result<Vec<u8>> {
    let bytes = if source.starts_with("http") {
        let client = CacheBust::now(BasicClient::new());
        fetch_bytes(&client, source).await?
    } else {
        std::fs::read(source)?
    };
    Ok(bytes)
}
