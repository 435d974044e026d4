//! Operator console commands.

use anyhow::{bail, Result};

/// One line typed at the operator console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Retry { feed_id: String },
    Toggle { feed_id: String },
    Locator { feed_id: String, locator: String },
    Mode { feed_id: String, mode_id: String },
    /// Close the socket if open, open it otherwise.
    Reconnect,
    Endpoint { url: String },
    Arm,
    Disarm,
    /// Print the newest log entries.
    Log { count: usize },
    Status,
    Help,
    Quit,
}

pub const USAGE: &str = "\
commands:
  retry <feed>             reload a feed
  toggle <feed>            play or pause a feed
  locator <feed> <source>  point a feed at a new source
  mode <feed> <mode>       change a feed's detection mode
  reconnect                close or reopen the detection socket
  endpoint <ws-url>        connect the socket to a new endpoint
  arm | disarm             enable or disable the intercept path
  log [n]                  show the last n log entries
  status                   show feeds and channels
  quit";

const DEFAULT_LOG_COUNT: usize = 20;

impl ConsoleCommand {
    /// Parse a console line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
            ("retry", [feed]) => Self::Retry {
                feed_id: feed.to_string(),
            },
            ("toggle", [feed]) => Self::Toggle {
                feed_id: feed.to_string(),
            },
            ("locator", [feed]) => Self::Locator {
                feed_id: feed.to_string(),
                locator: String::new(),
            },
            ("locator", [feed, locator]) => Self::Locator {
                feed_id: feed.to_string(),
                locator: locator.to_string(),
            },
            ("mode", [feed, mode]) => Self::Mode {
                feed_id: feed.to_string(),
                mode_id: mode.to_string(),
            },
            ("reconnect", []) => Self::Reconnect,
            ("endpoint", [url]) => Self::Endpoint {
                url: url.to_string(),
            },
            ("arm", []) => Self::Arm,
            ("disarm", []) => Self::Disarm,
            ("log", []) => Self::Log {
                count: DEFAULT_LOG_COUNT,
            },
            ("log", [count]) => match count.parse() {
                Ok(count) => Self::Log { count },
                Err(_) => bail!("log expects a number, got '{count}'"),
            },
            ("status", []) => Self::Status,
            ("help" | "?", []) => Self::Help,
            ("quit" | "exit", []) => Self::Quit,
            (
                "retry" | "toggle" | "locator" | "mode" | "reconnect" | "endpoint" | "arm"
                | "disarm" | "log" | "status" | "help" | "quit" | "exit",
                _,
            ) => bail!("wrong arguments for '{verb}'"),
            _ => bail!("unknown command '{verb}'"),
        };
        Ok(Some(command))
    }
}
