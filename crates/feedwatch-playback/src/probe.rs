//! Reachability-probing media sink.
//!
//! The monitor does not decode media. This sink stands in for a player
//! element: it checks that a source can be reached and reports the result
//! the way a player would, so sessions move through their real lifecycle.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};
use url::Url;

use feedwatch_ipc::{FeedConfig, LoadOutcome, LoadToken, MediaFailure, SourceKind};

use crate::classifier::classify;
use crate::sink::{LoadRequest, MediaSink, SinkFactory, SinkReporter};

/// Default time allowed for a network probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probe sink settings.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Time allowed for a TCP connect.
    pub timeout: Duration,

    /// When false, autoplay requests are refused as a browser would refuse
    /// them without a user gesture.
    pub allow_autoplay: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            allow_autoplay: true,
        }
    }
}

/// Where a locator would be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ProbeTarget {
    LocalFile(PathBuf),
    Network { host: String, port: u16 },
    Unsupported(String),
}

fn probe_target(locator: &str) -> ProbeTarget {
    let locator = locator.trim();

    if !locator.contains("://") {
        if classify(locator) == SourceKind::LiveStream {
            return match Url::parse(&format!("tcp://{locator}")) {
                Ok(url) => network_target(&url, 554),
                Err(e) => ProbeTarget::Unsupported(e.to_string()),
            };
        }
        return ProbeTarget::LocalFile(PathBuf::from(locator));
    }

    let url = match Url::parse(locator) {
        Ok(url) => url,
        Err(e) => return ProbeTarget::Unsupported(e.to_string()),
    };

    match url.scheme() {
        "file" => url
            .to_file_path()
            .map(ProbeTarget::LocalFile)
            .unwrap_or_else(|_| ProbeTarget::Unsupported(locator.to_string())),
        "http" | "ws" => network_target(&url, 80),
        "https" | "wss" => network_target(&url, 443),
        "rtsp" => network_target(&url, 554),
        "rtsps" => network_target(&url, 322),
        "rtmp" => network_target(&url, 1935),
        "rtmps" => network_target(&url, 443),
        other => ProbeTarget::Unsupported(format!("unsupported scheme {other}")),
    }
}

fn network_target(url: &Url, default_port: u16) -> ProbeTarget {
    match url.host_str() {
        Some(host) => ProbeTarget::Network {
            host: host.trim_matches(['[', ']']).to_string(),
            port: url.port().unwrap_or(default_port),
        },
        None => ProbeTarget::Unsupported(format!("missing host in {url}")),
    }
}

fn probe_tcp(host: &str, port: u16, timeout: Duration) -> LoadOutcome {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(e) => {
            return LoadOutcome::Failed {
                failure: MediaFailure::NetworkUnreachable,
                detail: format!("cannot resolve {host}: {e}"),
            }
        }
    };

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(_) => return LoadOutcome::Ready,
            Err(e) => {
                trace!(%addr, "Probe failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    let failure = match last_error.as_ref().map(io::Error::kind) {
        Some(io::ErrorKind::PermissionDenied) => MediaFailure::SecurityBlocked,
        _ => MediaFailure::NetworkUnreachable,
    };
    let detail = match last_error {
        Some(e) => format!("{host}:{port}: {e}"),
        None => format!("{host}:{port}: no addresses"),
    };
    LoadOutcome::Failed { failure, detail }
}

/// Media sink that probes reachability instead of decoding.
pub struct ProbeSink {
    reporter: SinkReporter,
    config: ProbeConfig,
    active: Arc<Mutex<Option<LoadToken>>>,
}

impl ProbeSink {
    pub fn new(reporter: SinkReporter, config: ProbeConfig) -> Self {
        Self {
            reporter,
            config,
            active: Arc::new(Mutex::new(None)),
        }
    }
}

impl MediaSink for ProbeSink {
    fn load(&mut self, request: &LoadRequest) {
        let token = request.token;
        *self.active.lock() = Some(token);

        match probe_target(&request.locator) {
            ProbeTarget::LocalFile(path) => {
                let outcome = if path.exists() {
                    LoadOutcome::Ready
                } else {
                    LoadOutcome::Failed {
                        failure: MediaFailure::NetworkUnreachable,
                        detail: format!("{} not found", path.display()),
                    }
                };
                self.reporter.load_settled(token, outcome);
            }
            ProbeTarget::Unsupported(detail) => {
                self.reporter.load_settled(
                    token,
                    LoadOutcome::Failed {
                        failure: MediaFailure::UnsupportedFormat,
                        detail,
                    },
                );
            }
            ProbeTarget::Network { host, port } => {
                debug!(feed_id = %self.reporter.feed_id(), %host, port, %token, "Probing source");
                let reporter = self.reporter.clone();
                let active = Arc::clone(&self.active);
                let timeout = self.config.timeout;
                thread::spawn(move || {
                    let outcome = probe_tcp(&host, port, timeout);
                    if *active.lock() == Some(token) {
                        reporter.load_settled(token, outcome);
                    } else {
                        trace!(%token, "Probe result for cancelled load dropped");
                    }
                });
            }
        }
    }

    fn cancel(&mut self, token: LoadToken) {
        let mut active = self.active.lock();
        if *active == Some(token) {
            *active = None;
        }
    }

    fn play(&mut self, token: LoadToken, autoplay: bool) {
        if autoplay && !self.config.allow_autoplay {
            debug!(feed_id = %self.reporter.feed_id(), %token, "Refusing autoplay");
            self.reporter.autoplay_rejected(token);
        }
    }

    fn pause(&mut self, token: LoadToken) {
        trace!(feed_id = %self.reporter.feed_id(), %token, "Pause");
    }

    fn unload(&mut self) {
        *self.active.lock() = None;
    }
}

/// Creates a [`ProbeSink`] per feed.
#[derive(Debug, Clone, Default)]
pub struct ProbeSinkFactory {
    pub config: ProbeConfig,
}

impl SinkFactory for ProbeSinkFactory {
    fn create(&self, _feed: &FeedConfig, reporter: SinkReporter) -> Box<dyn MediaSink> {
        Box::new(ProbeSink::new(reporter, self.config.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedwatch_ipc::{command_channel, SessionCommand};
    use std::net::TcpListener;

    fn request(token: u64, locator: &str) -> LoadRequest {
        let kind = classify(locator);
        LoadRequest {
            token: LoadToken(token),
            locator: locator.to_string(),
            kind,
            looping: kind.loops(),
            force_reload: false,
        }
    }

    fn settled(command: SessionCommand) -> (LoadToken, LoadOutcome) {
        match command {
            SessionCommand::LoadSettled { token, outcome, .. } => (token, outcome),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_probe_targets() {
        assert_eq!(
            probe_target("rtsp://10.0.0.5/live"),
            ProbeTarget::Network {
                host: "10.0.0.5".to_string(),
                port: 554
            }
        );
        assert_eq!(
            probe_target("192.168.1.4:8080"),
            ProbeTarget::Network {
                host: "192.168.1.4".to_string(),
                port: 8080
            }
        );
        assert_eq!(
            probe_target("/srv/cams/lobby.mp4"),
            ProbeTarget::LocalFile(PathBuf::from("/srv/cams/lobby.mp4"))
        );
        assert!(matches!(
            probe_target("ftp://host/a.mp4"),
            ProbeTarget::Unsupported(_)
        ));
    }

    #[test]
    fn test_local_file_probe() {
        let (tx, rx) = command_channel();
        let mut sink = ProbeSink::new(SinkReporter::new("1", tx), ProbeConfig::default());

        let existing = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        sink.load(&request(1, existing));
        assert_eq!(settled(rx.try_recv().unwrap()), (LoadToken(1), LoadOutcome::Ready));

        sink.load(&request(2, "/definitely/not/here/clip.mp4"));
        let (token, outcome) = settled(rx.try_recv().unwrap());
        assert_eq!(token, LoadToken(2));
        assert!(matches!(
            outcome,
            LoadOutcome::Failed {
                failure: MediaFailure::NetworkUnreachable,
                ..
            }
        ));
    }

    #[test]
    fn test_network_probe_reachable_and_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let open = listener.local_addr().unwrap();

        let closed = {
            let tmp = TcpListener::bind("127.0.0.1:0").unwrap();
            tmp.local_addr().unwrap()
        };

        let (tx, rx) = command_channel();
        let mut sink = ProbeSink::new(SinkReporter::new("1", tx.clone()), ProbeConfig::default());
        sink.load(&request(1, &open.to_string()));
        let (_, outcome) = settled(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert_eq!(outcome, LoadOutcome::Ready);

        let mut sink = ProbeSink::new(SinkReporter::new("2", tx), ProbeConfig::default());
        sink.load(&request(2, &closed.to_string()));
        let (_, outcome) = settled(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        assert!(matches!(outcome, LoadOutcome::Failed { .. }));
    }

    #[test]
    fn test_unsupported_scheme() {
        let (tx, rx) = command_channel();
        let mut sink = ProbeSink::new(SinkReporter::new("1", tx), ProbeConfig::default());
        sink.load(&request(1, "gopher://old.example/feed"));
        let (_, outcome) = settled(rx.try_recv().unwrap());
        assert!(matches!(
            outcome,
            LoadOutcome::Failed {
                failure: MediaFailure::UnsupportedFormat,
                ..
            }
        ));
    }

    #[test]
    fn test_autoplay_refused_when_disallowed() {
        let (tx, rx) = command_channel();
        let config = ProbeConfig {
            allow_autoplay: false,
            ..ProbeConfig::default()
        };
        let mut sink = ProbeSink::new(SinkReporter::new("1", tx), config);

        sink.play(LoadToken(3), false);
        assert!(rx.try_recv().is_err());

        sink.play(LoadToken(3), true);
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionCommand::AutoplayRejected {
                token: LoadToken(3),
                ..
            }
        ));
    }
}
