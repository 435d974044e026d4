//! Feedwatch command line entry point.

use std::io;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use feedwatch_lib::config::{MonitorArgs, MonitorConfig};
use feedwatch_lib::monitor::{run_console, Monitor};
use feedwatch_lib::{init_logging, simulate};

#[derive(Parser)]
#[command(name = "feedwatch", version)]
#[command(about = "Camera feed monitor with detection event ingestion", long_about = None)]
struct Cli {
    /// Debug logging for every feedwatch crate.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch feeds and log detections from both channels
    Monitor(MonitorArgs),

    /// POST random detections to a running monitor
    SendDetections {
        #[arg(long, default_value_t = 5)]
        count: usize,

        /// Seconds between events.
        #[arg(long, default_value_t = 2.0)]
        interval: f64,

        #[arg(long, default_value = "http://localhost:5173/detection_output")]
        url: String,

        /// Feed ids to pick from. May be repeated.
        #[arg(long = "feed-id", default_values_t = ["1".to_string(), "2".to_string()])]
        feed_ids: Vec<String>,
    },

    /// Serve a websocket that publishes random detections
    SimulateSocket {
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,

        /// Feed ids to pick from. May be repeated.
        #[arg(long = "feed-id", default_values_t = ["1".to_string(), "2".to_string()])]
        feed_ids: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Monitor(args) => {
            let config = MonitorConfig::resolve(&args)?;
            if config.feeds.is_empty() {
                info!("No feeds configured, only detections will be logged");
            }
            let mut monitor = Monitor::start(&config)?;
            run_console(&mut monitor, io::stdin().lock())
        }
        Commands::SendDetections {
            count,
            interval,
            url,
            feed_ids,
        } => {
            if !interval.is_finite() || interval < 0.0 {
                bail!("Interval must be a non-negative number of seconds");
            }
            simulate::send_detections(&url, count, Duration::from_secs_f64(interval), &feed_ids)?;
            Ok(())
        }
        Commands::SimulateSocket { listen, feed_ids } => {
            simulate::simulate_socket(&listen, feed_ids)
        }
    }
}
