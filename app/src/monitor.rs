//! Wires the session manager and the ingestion channels together.

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::{error, info, warn};

use feedwatch_ingest::{
    format_entry, ConnectionEvent, ConnectionState, EventBus, EventLog, InterceptAdapter,
    IngestServer, SocketAdapter,
};
use feedwatch_ipc::{command_channel, event_channel, SessionCommand, SessionEvent, SessionView};

use crate::commands::{ConsoleCommand, USAGE};
use crate::config::MonitorConfig;

const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// A running monitor: playback sessions for every feed plus both
/// detection channels feeding one log.
pub struct Monitor {
    bus: EventBus,
    log: EventLog,
    intercept: Arc<InterceptAdapter>,
    server: IngestServer,
    socket: SocketAdapter,
    command_tx: Sender<SessionCommand>,
    event_rx: Receiver<SessionEvent>,
    manager: Option<JoinHandle<()>>,
}

impl Monitor {
    /// Open the ingestion channels, then start the session manager and
    /// activate the configured feeds.
    ///
    /// The manager thread is spawned last, so a failure to open a channel
    /// never leaves it running.
    pub fn start(config: &MonitorConfig) -> Result<Self> {
        let bus = EventBus::new();
        let log = EventLog::attach(&bus);

        let intercept = Arc::new(
            InterceptAdapter::new(config.ingest.intercept_path.clone(), bus.clone())
                .context("Invalid intercept path")?,
        );
        let server = IngestServer::start(&config.ingest.listen_addr, Arc::clone(&intercept))
            .context("Failed to start ingestion endpoint")?;

        let socket = SocketAdapter::new(&config.ingest.socket_endpoint, bus.clone())
            .context("Invalid socket endpoint")?;
        if config.ingest.connect_socket_on_start {
            if let Err(e) = socket.connect() {
                warn!("Socket connect failed: {}", e);
            }
        }

        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();

        let mut manager = feedwatch_playback::create_manager(
            command_rx,
            event_tx,
            config.playback.probe_config(),
        );
        let manager = thread::Builder::new()
            .name("session-manager".to_string())
            .spawn(move || {
                info!("Session manager thread starting");
                manager.run();
                info!("Session manager thread stopped");
            })
            .context("Failed to spawn session manager thread")?;

        for feed in &config.feeds {
            if command_tx
                .send(SessionCommand::Activate { feed: feed.clone() })
                .is_err()
            {
                if manager.join().is_err() {
                    error!("Session manager thread panicked");
                }
                bail!("Session manager stopped during startup");
            }
        }

        info!(
            feeds = config.feeds.len(),
            listen = %server.local_addr(),
            socket = %config.ingest.socket_endpoint,
            "Monitor started"
        );

        Ok(Self {
            bus,
            log,
            intercept,
            server,
            socket,
            command_tx,
            event_rx,
            manager: Some(manager),
        })
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    /// Address of the ingestion endpoint.
    pub fn server_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn socket_state(&self) -> ConnectionState {
        self.socket.state()
    }

    pub fn socket_status(&self) -> Receiver<ConnectionEvent> {
        self.socket.subscribe_status()
    }

    /// Session events. Receivers compete, so only one consumer should read.
    pub fn session_events(&self) -> Receiver<SessionEvent> {
        self.event_rx.clone()
    }

    pub fn send(&self, command: SessionCommand) -> Result<()> {
        self.command_tx
            .send(command)
            .map_err(|_| anyhow!("Session manager is not running"))
    }

    /// Ask the manager for a snapshot and wait for it, skipping other events.
    pub fn snapshot(&self) -> Result<Vec<SessionView>> {
        self.send(SessionCommand::GetSnapshot)?;
        loop {
            match self.event_rx.recv_timeout(SNAPSHOT_TIMEOUT) {
                Ok(SessionEvent::Snapshot(views)) => return Ok(views),
                Ok(_) => continue,
                Err(e) => bail!("Timeout waiting for snapshot: {}", e),
            }
        }
    }

    /// Apply one console command. Returns text to show the operator.
    pub fn execute(&mut self, command: ConsoleCommand) -> Result<Option<String>> {
        match command {
            ConsoleCommand::Retry { feed_id } => {
                self.send(SessionCommand::Retry { feed_id })?;
            }
            ConsoleCommand::Toggle { feed_id } => {
                self.send(SessionCommand::TogglePlayback { feed_id })?;
            }
            ConsoleCommand::Locator { feed_id, locator } => {
                self.send(SessionCommand::SetLocator { feed_id, locator })?;
            }
            ConsoleCommand::Mode { feed_id, mode_id } => {
                self.send(SessionCommand::ChangeDetectionMode { feed_id, mode_id })?;
            }
            ConsoleCommand::Reconnect => {
                let state = self.socket.toggle()?;
                return Ok(Some(format!("socket: {}", state.message())));
            }
            ConsoleCommand::Endpoint { url } => {
                self.socket.set_endpoint(&url)?;
                return Ok(Some(format!("socket endpoint set to {url}")));
            }
            ConsoleCommand::Arm => {
                self.intercept.arm();
                return Ok(Some(format!("intercepting {}", self.intercept.path())));
            }
            ConsoleCommand::Disarm => {
                self.intercept.disarm();
                return Ok(Some(format!("passing {} through", self.intercept.path())));
            }
            ConsoleCommand::Log { count } => {
                let lines: Vec<String> = self.log.tail(count).iter().map(format_entry).collect();
                if lines.is_empty() {
                    return Ok(Some("log is empty".to_string()));
                }
                return Ok(Some(lines.join("\n")));
            }
            ConsoleCommand::Status => {
                self.send(SessionCommand::GetSnapshot)?;
                return Ok(Some(format!(
                    "socket {}: {}\nintercept {}: {}\nlog: {} entries",
                    self.socket.endpoint(),
                    self.socket.state().message(),
                    self.intercept.path(),
                    if self.intercept.is_armed() { "armed" } else { "disarmed" },
                    self.log.len()
                )));
            }
            ConsoleCommand::Help => return Ok(Some(USAGE.to_string())),
            ConsoleCommand::Quit => self.shutdown(),
        }
        Ok(None)
    }

    /// Stop the manager and close both channels.
    pub fn shutdown(&mut self) {
        let Some(manager) = self.manager.take() else {
            return;
        };
        info!("Shutting down monitor");

        if self.command_tx.send(SessionCommand::Shutdown).is_err() {
            warn!("Session manager already stopped");
        }
        if manager.join().is_err() {
            error!("Session manager thread panicked");
        }

        self.socket.teardown();
        self.intercept.disarm();
        self.server.stop();
        self.log.detach();
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Describe a session event for the console.
pub fn describe_session_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::StateChanged {
            feed_id,
            previous,
            current,
        } => Some(format!(
            "feed {}: {} -> {}",
            feed_id,
            previous.name(),
            current.name()
        )),
        SessionEvent::Error { feed_id, error } => {
            Some(format!("feed {} error: {}", feed_id, error.message()))
        }
        SessionEvent::CommandRejected { feed_id, message } => Some(match feed_id {
            Some(feed_id) => format!("feed {feed_id}: {message}"),
            None => message.clone(),
        }),
        SessionEvent::SessionClosed { feed_id } => Some(format!("feed {feed_id} closed")),
        SessionEvent::Snapshot(views) => Some(
            views
                .iter()
                .map(describe_view)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        SessionEvent::Ready | SessionEvent::Shutdown => None,
    }
}

fn describe_view(view: &SessionView) -> String {
    let mut line = format!(
        "feed {} ({}): {} {}",
        view.feed_id,
        view.name,
        view.source_kind.name(),
        view.state.name()
    );
    if view.live_badge {
        line.push_str(" [LIVE]");
    }
    if view.looping {
        line.push_str(" [loop]");
    }
    if view.retry_count > 0 {
        line.push_str(&format!(" retries={}", view.retry_count));
    }
    if !view.detection_mode.is_empty() {
        line.push_str(&format!(" mode={}", view.detection_mode));
    }
    if let Some(error) = &view.last_error {
        line.push_str(&format!(" error: {}", error.message()));
    }
    line
}

/// Run the interactive console until `quit` or end of input.
pub fn run_console(monitor: &mut Monitor, input: impl BufRead) -> Result<()> {
    let printer = monitor.bus().subscribe(|event| println!("{}", format_entry(event)));

    let session_events = monitor.session_events();
    let session_printer = thread::spawn(move || {
        for event in session_events.iter() {
            if let Some(line) = describe_session_event(&event) {
                println!("{line}");
            }
        }
    });

    let status = monitor.socket_status();
    let status_printer = thread::spawn(move || {
        for event in status.iter() {
            println!("socket {}: {}", event.endpoint, event.current.message());
        }
    });

    println!("feedwatch ready, ingesting on http://{}", monitor.server_addr());
    println!("type 'help' for commands");

    for line in input.lines() {
        let line = line.context("Failed to read console input")?;
        match ConsoleCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => match monitor.execute(command) {
                Ok(Some(reply)) => println!("{reply}"),
                Ok(None) => {}
                Err(e) => eprintln!("error: {e:#}"),
            },
            Err(e) => eprintln!("error: {e}"),
        }
    }

    monitor.bus().unsubscribe(printer);
    monitor.shutdown();
    let _ = session_printer.join();
    let _ = status_printer.join();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::TcpListener;
    use std::time::Instant;

    use futures_util::SinkExt;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::Message;

    use feedwatch_ipc::{FeedConfig, PlaybackState, SourceKind};

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn settled(monitor: &Monitor) -> Vec<SessionView> {
        let mut views = Vec::new();
        wait_until(|| {
            views = monitor.snapshot().unwrap();
            views.iter().all(|v| !v.state.is_loading())
        });
        views
    }

    fn clip_file() -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("feedwatch-e2e-{}.mp4", std::process::id()));
        fs::write(&path, b"not really a video").unwrap();
        path
    }

    fn config(feeds: Vec<FeedConfig>, socket_endpoint: String) -> MonitorConfig {
        let mut config = MonitorConfig::default();
        config.feeds = feeds;
        config.ingest.listen_addr = "127.0.0.1:0".to_string();
        config.ingest.socket_endpoint = socket_endpoint;
        config.index_feeds();
        config
    }

    #[test]
    fn test_two_feeds_and_cross_channel_order() {
        let camera = TcpListener::bind("127.0.0.1:0").unwrap();
        let clip = clip_file();

        // Websocket publisher that sends one frame when told to.
        let server_rt = tokio::runtime::Runtime::new().unwrap();
        let ws_listener = server_rt
            .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let endpoint = format!("ws://{}/ws", ws_listener.local_addr().unwrap());
        let (send_tx, send_rx) = oneshot::channel::<()>();
        server_rt.spawn(async move {
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = send_rx.await;
            ws.send(Message::Text(
                r#"{"event":"Vehicle detected","feedId":"2","confidence":0.7}"#.to_string(),
            ))
            .await
            .unwrap();
            futures_util::future::pending::<()>().await;
        });

        let mut monitor = Monitor::start(&config(
            vec![
                FeedConfig::new("1", camera.local_addr().unwrap().to_string()),
                FeedConfig::new("2", clip.display().to_string()),
            ],
            endpoint,
        ))
        .unwrap();

        let views = settled(&monitor);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].feed_id, "1");
        assert_eq!(views[0].source_kind, SourceKind::LiveStream);
        assert_eq!(views[0].state, PlaybackState::Playing);
        assert!(views[0].live_badge);
        assert!(!views[0].looping);
        assert_eq!(views[1].source_kind, SourceKind::FileVideo);
        assert_eq!(views[1].state, PlaybackState::Paused);
        assert!(views[1].looping);
        assert!(!views[1].live_badge);

        assert!(wait_until(|| monitor.socket_state().is_connected()));

        let url = format!("http://{}/detection_output", monitor.server_addr());
        let response = ureq::post(&url)
            .send_json(serde_json::json!({
                "event": "Person detected",
                "feedId": "1",
                "timestamp": "14:35:22",
                "confidence": 0.95,
            }))
            .unwrap();
        assert_eq!(response.status(), 200);
        send_tx.send(()).unwrap();

        assert!(wait_until(|| monitor.log().len() == 2));
        let entries = monitor.log().entries();
        assert_eq!(entries[0].feed_id, "1");
        assert_eq!(entries[1].feed_id, "2");
        assert!(entries[0].sequence < entries[1].sequence);
        assert_eq!(
            format_entry(&entries[0]),
            "[14:35:22] feed 1: Person detected (95%)"
        );

        monitor.shutdown();
        fs::remove_file(clip).unwrap();
    }

    #[test]
    fn test_failed_start_never_activates_feeds() {
        let camera = TcpListener::bind("127.0.0.1:0").unwrap();
        camera.set_nonblocking(true).unwrap();
        let feeds = vec![FeedConfig::new("1", camera.local_addr().unwrap().to_string())];

        let bad_socket = config(feeds.clone(), "http://127.0.0.1:9/ws".to_string());
        match Monitor::start(&bad_socket) {
            Ok(_) => panic!("start should fail on a non-websocket endpoint"),
            Err(e) => assert_eq!(e.to_string(), "Invalid socket endpoint"),
        }

        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut bad_listen = config(feeds, "ws://127.0.0.1:9/ws".to_string());
        bad_listen.ingest.listen_addr = taken.local_addr().unwrap().to_string();
        match Monitor::start(&bad_listen) {
            Ok(_) => panic!("start should fail on a taken listen address"),
            Err(e) => assert_eq!(e.to_string(), "Failed to start ingestion endpoint"),
        }

        thread::sleep(Duration::from_millis(500));
        let accepted = camera.accept();
        assert!(matches!(
            accepted,
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock
        ));
    }

    #[test]
    fn test_console_commands_reach_sessions() {
        let mut monitor = Monitor::start(&config(
            vec![FeedConfig::new("1", "")],
            "ws://127.0.0.1:9/ws".to_string(),
        ))
        .unwrap();

        let views = settled(&monitor);
        assert_eq!(views[0].state, PlaybackState::Error);
        assert!(views[0]
            .last_error
            .as_ref()
            .is_some_and(|e| e.is_configuration()));

        monitor
            .execute(ConsoleCommand::Mode {
                feed_id: "1".to_string(),
                mode_id: "vehicle".to_string(),
            })
            .unwrap();
        monitor
            .execute(ConsoleCommand::Retry {
                feed_id: "1".to_string(),
            })
            .unwrap();
        let views = settled(&monitor);
        assert_eq!(views[0].detection_mode, "vehicle");
        assert_eq!(views[0].retry_count, 1);

        let reply = monitor.execute(ConsoleCommand::Disarm).unwrap().unwrap();
        assert_eq!(reply, "passing /detection_output through");
        let url = format!("http://{}/detection_output", monitor.server_addr());
        assert!(ureq::post(&url).send_string("{}").is_err());
        assert!(monitor.log().is_empty());

        assert_eq!(monitor.execute(ConsoleCommand::Quit).unwrap(), None);
        assert!(monitor.send(SessionCommand::GetSnapshot).is_err());
    }

    #[test]
    fn test_describe_snapshot() {
        let view = SessionView {
            feed_id: "1".to_string(),
            name: "Lobby".to_string(),
            source_kind: SourceKind::LiveStream,
            state: PlaybackState::Playing,
            last_error: None,
            retry_count: 2,
            live_badge: true,
            looping: false,
            detection_mode: "person".to_string(),
        };
        assert_eq!(
            describe_session_event(&SessionEvent::Snapshot(vec![view])).unwrap(),
            "feed 1 (Lobby): live Playing [LIVE] retries=2 mode=person"
        );
        assert_eq!(describe_session_event(&SessionEvent::Ready), None);
    }
}
