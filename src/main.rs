//! CLI entry point for the bike-share trip digest.
//!
//! Aggregates a directory of historical trip archives into the single JSON
//! document consumed by the dashboard renderer.

use anyhow::Result;
use bikeshare_digest::analyzers::analyzer::run;
use bikeshare_digest::config::AggregationConfig;
use bikeshare_digest::output::{print_json, write_json};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "bikeshare_digest")]
#[command(about = "Aggregate bike-share trip archives into a dashboard document", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fold every trip archive in a directory and write the dashboard JSON
    Aggregate {
        /// Directory containing .zip, .csv or .csv.gz trip files
        #[arg(short = 'd', long, default_value = "./data/")]
        data_dir: PathBuf,

        /// Path of the JSON document to write
        #[arg(short, long, default_value = "./dashboard_data.json")]
        output: PathBuf,

        /// Optional JSON file with aggregation limits
        #[arg(short, long)]
        config: Option<String>,

        /// Number of archives folded concurrently
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Number of busiest stations that keep a monthly trend
        #[arg(long)]
        station_monthly_limit: Option<usize>,

        /// Number of routes kept in top_routes
        #[arg(long)]
        top_routes_limit: Option<usize>,

        /// Minimum departures for a station to be listed
        #[arg(long)]
        min_station_departures: Option<u64>,

        /// Indent the JSON output
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/bikeshare_digest.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("bikeshare_digest.log"));

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
        Commands::Aggregate {
            data_dir,
            output,
            config,
            jobs,
            station_monthly_limit,
            top_routes_limit,
            min_station_departures,
            pretty,
        } => {
            let config = match config {
                Some(path) => AggregationConfig::load(&path)?,
                None => AggregationConfig::default(),
            }
            .with_overrides(station_monthly_limit, top_routes_limit, min_station_departures);
            info!(?config, jobs, "Starting aggregation");

            let doc = run(&data_dir, &config, jobs).await?;
            write_json(&output, &doc, pretty)?;
            print_json(&doc.summary)?;
        }
    }

    Ok(())
}
