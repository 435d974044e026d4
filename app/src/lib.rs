//! Feedwatch operator application.
//!
//! Loads the configuration, starts the playback session manager and both
//! detection channels, and drives them from a line-oriented console.

pub mod commands;
pub mod config;
pub mod monitor;
pub mod simulate;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging. Output goes to stderr so console replies stay readable.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose {
        "feedwatch=debug,feedwatch_lib=debug,feedwatch_playback=debug,feedwatch_ingest=debug"
    } else {
        "feedwatch=info,feedwatch_lib=info,feedwatch_playback=info,feedwatch_ingest=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
