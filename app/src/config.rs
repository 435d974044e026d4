//! Monitor configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use feedwatch_ingest::{DEFAULT_INTERCEPT_PATH, DEFAULT_LISTEN_ADDR, DEFAULT_SOCKET_ENDPOINT};
use feedwatch_ipc::FeedConfig;
use feedwatch_playback::ProbeConfig;

/// Everything the monitor needs to start.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MonitorConfig {
    pub feeds: Vec<FeedConfig>,
    pub ingest: IngestConfig,
    pub playback: PlaybackConfig,
}

/// Detection ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IngestConfig {
    /// Path whose POSTs are treated as detection payloads.
    pub intercept_path: String,

    /// Address of the local ingestion endpoint.
    pub listen_addr: String,

    /// Websocket endpoint publishing detections.
    pub socket_endpoint: String,

    pub connect_socket_on_start: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            intercept_path: DEFAULT_INTERCEPT_PATH.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            socket_endpoint: DEFAULT_SOCKET_ENDPOINT.to_string(),
            connect_socket_on_start: true,
        }
    }
}

/// Playback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlaybackConfig {
    pub allow_autoplay: bool,
    pub probe_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            allow_autoplay: true,
            probe_timeout_ms: 3000,
        }
    }
}

impl PlaybackConfig {
    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            timeout: Duration::from_millis(self.probe_timeout_ms),
            allow_autoplay: self.allow_autoplay,
        }
    }
}

/// Command line options of the `monitor` subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct MonitorArgs {
    /// JSON configuration file.
    #[arg(long, env = "FEEDWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address of the ingestion endpoint.
    #[arg(long, env = "FEEDWATCH_LISTEN")]
    pub listen: Option<String>,

    /// Websocket endpoint to receive detections from.
    #[arg(long, env = "FEEDWATCH_SOCKET")]
    pub socket: Option<String>,

    /// Path intercepted on the ingestion endpoint.
    #[arg(long)]
    pub intercept_path: Option<String>,

    /// Add a feed, as `id=locator`. May be repeated.
    #[arg(long = "feed", value_name = "ID=LOCATOR")]
    pub feeds: Vec<String>,

    /// Do not connect the websocket at startup.
    #[arg(long)]
    pub no_socket: bool,

    /// Refuse autoplay, as a browser without a user gesture would.
    #[arg(long)]
    pub no_autoplay: bool,
}

impl MonitorConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Build the effective configuration: file first, then flags.
    pub fn resolve(args: &MonitorArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        if let Some(listen) = &args.listen {
            config.ingest.listen_addr = listen.clone();
        }
        if let Some(socket) = &args.socket {
            config.ingest.socket_endpoint = socket.clone();
        }
        if let Some(path) = &args.intercept_path {
            config.ingest.intercept_path = path.clone();
        }
        if args.no_socket {
            config.ingest.connect_socket_on_start = false;
        }
        if args.no_autoplay {
            config.playback.allow_autoplay = false;
        }
        for feed in &args.feeds {
            config.add_feed(feed)?;
        }

        config.index_feeds();
        Ok(config)
    }

    /// Add a feed from an `id=locator` argument.
    pub fn add_feed(&mut self, spec: &str) -> Result<()> {
        let Some((id, locator)) = spec.split_once('=') else {
            bail!("Invalid feed '{spec}', expected ID=LOCATOR");
        };
        let id = id.trim();
        if id.is_empty() {
            bail!("Invalid feed '{spec}', id is empty");
        }
        if self.feeds.iter().any(|f| f.id == id) {
            bail!("Feed {id} is configured twice");
        }
        self.feeds.push(FeedConfig::new(id, locator.trim()));
        Ok(())
    }

    /// Number the feeds in grid order.
    pub fn index_feeds(&mut self) {
        let total = self.feeds.len();
        for (index, feed) in self.feeds.iter_mut().enumerate() {
            feed.feed_index = index;
            feed.total_feeds = total;
        }
    }

    pub fn feed_ids(&self) -> Vec<String> {
        self.feeds.iter().map(|f| f.id.clone()).collect()
    }
}
