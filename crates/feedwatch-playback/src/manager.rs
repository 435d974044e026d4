//! Session manager: owns every playback session and runs the command loop.

use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use feedwatch_ipc::{FeedConfig, ModeCatalog, SessionCommand, SessionEvent, SessionView};

use crate::error::SessionError;
use crate::session::PlaybackSession;
use crate::sink::{SinkFactory, SinkReporter};
use crate::SessionResult;

/// Owns the playback sessions of all active feeds.
///
/// Commands from the UI arrive on a bounded queue. Sink results arrive on
/// an unbounded report queue, so a burst of UI commands can never push out
/// the only result a session is waiting for. Both are applied one at a time
/// on the manager thread, so no two transitions of a session ever interleave.
pub struct SessionManager {
    command_rx: Receiver<SessionCommand>,
    report_tx: Sender<SessionCommand>,
    report_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,
    sessions: Vec<PlaybackSession>,
    sink_factory: Box<dyn SinkFactory>,
    modes: ModeCatalog,
}

impl SessionManager {
    /// Create a manager.
    pub fn new(
        command_rx: Receiver<SessionCommand>,
        event_tx: Sender<SessionEvent>,
        sink_factory: Box<dyn SinkFactory>,
    ) -> Self {
        let (report_tx, report_rx) = crossbeam_channel::unbounded();
        Self {
            command_rx,
            report_tx,
            report_rx,
            event_tx,
            sessions: Vec::new(),
            sink_factory,
            modes: ModeCatalog::builtin(),
        }
    }

    /// Replace the detection mode catalog.
    pub fn with_modes(mut self, modes: ModeCatalog) -> Self {
        self.modes = modes;
        self
    }

    /// Run the manager (blocking).
    #[instrument(name = "session_manager_run", skip(self))]
    pub fn run(&mut self) {
        info!("Session manager starting");
        self.send_event(SessionEvent::Ready);

        let commands = self.command_rx.clone();
        let reports = self.report_rx.clone();
        loop {
            self.apply_reports();
            select! {
                recv(reports) -> report => {
                    if let Ok(report) = report {
                        self.handle_command(report);
                    }
                }
                recv(commands) -> command => match command {
                    Ok(command) => {
                        if !self.handle_command(command) {
                            break;
                        }
                    }
                    Err(_) => {
                        info!("Command channel disconnected, shutting down");
                        break;
                    }
                },
            }
        }

        self.teardown_all();
        info!("Session manager stopped");
    }

    /// Apply every sink result reported so far.
    pub fn apply_reports(&mut self) {
        while let Ok(report) = self.report_rx.try_recv() {
            self.handle_command(report);
        }
    }

    /// Handle a command. Returns false if the manager should stop.
    pub fn handle_command(&mut self, command: SessionCommand) -> bool {
        debug!(?command, "Handling command");

        let feed_id = command.feed_id().map(str::to_string);
        let result = match command {
            SessionCommand::Activate { feed } => self.activate(feed),
            SessionCommand::Deactivate { feed_id } => self.deactivate(&feed_id),
            SessionCommand::SetLocator { feed_id, locator } => {
                self.with_session(&feed_id, |s| {
                    s.set_locator(locator);
                    Ok(())
                })
            }
            SessionCommand::Retry { feed_id } => self.with_session(&feed_id, |s| {
                s.retry();
                Ok(())
            }),
            SessionCommand::TogglePlayback { feed_id } => {
                self.with_session(&feed_id, |s| s.toggle_playback().map(|_| ()))
            }
            SessionCommand::ChangeDetectionMode { feed_id, mode_id } => {
                self.change_detection_mode(&feed_id, mode_id)
            }
            SessionCommand::LoadSettled {
                feed_id,
                token,
                outcome,
            } => self.with_known_session(&feed_id, |s| {
                s.load_settled(token, outcome);
            }),
            SessionCommand::AutoplayRejected { feed_id, token } => {
                self.with_known_session(&feed_id, |s| {
                    s.autoplay_rejected(token);
                })
            }
            SessionCommand::MediaFailed {
                feed_id,
                token,
                failure,
                detail,
            } => self.with_known_session(&feed_id, |s| {
                s.media_failed(token, failure, detail);
            }),
            SessionCommand::GetSnapshot => {
                self.send_event(SessionEvent::Snapshot(self.snapshot()));
                Ok(())
            }
            SessionCommand::Shutdown => {
                self.teardown_all();
                self.send_event(SessionEvent::Shutdown);
                return false;
            }
        };

        if let Err(e) = result {
            warn!("Command rejected: {}", e);
            self.send_event(SessionEvent::CommandRejected {
                feed_id,
                message: e.to_string(),
            });
        }

        true
    }

    /// Views of every session, ordered by grid position.
    pub fn snapshot(&self) -> Vec<SessionView> {
        let mut sessions: Vec<_> = self.sessions.iter().collect();
        sessions.sort_by_key(|s| s.feed().feed_index);
        sessions.iter().map(|s| s.view()).collect()
    }

    pub fn session(&self, feed_id: &str) -> Option<&PlaybackSession> {
        self.sessions.iter().find(|s| s.feed_id() == feed_id)
    }

    #[instrument(name = "activate_feed", skip(self, feed), fields(feed_id = %feed.id))]
    fn activate(&mut self, feed: FeedConfig) -> SessionResult<()> {
        if self.session(&feed.id).is_some() {
            return Err(SessionError::DuplicateFeed(feed.id));
        }
        if !feed.detection_mode.is_empty() && !self.modes.contains(&feed.detection_mode) {
            warn!(mode = %feed.detection_mode, "Feed configured with unknown detection mode");
        }

        let reporter = SinkReporter::new(feed.id.clone(), self.report_tx.clone());
        let sink = self.sink_factory.create(&feed, reporter);
        let mut session = PlaybackSession::new(feed, sink);
        session.mount();
        self.flush_session(&mut session);
        self.sessions.push(session);
        Ok(())
    }

    #[instrument(name = "deactivate_feed", skip(self))]
    fn deactivate(&mut self, feed_id: &str) -> SessionResult<()> {
        let index = self.index_of(feed_id)?;
        let mut session = self.sessions.remove(index);
        session.teardown();
        self.flush_session(&mut session);
        self.send_event(SessionEvent::SessionClosed {
            feed_id: feed_id.to_string(),
        });
        Ok(())
    }

    fn change_detection_mode(&mut self, feed_id: &str, mode_id: String) -> SessionResult<()> {
        let label = self.modes.label(&mode_id)?.to_string();
        self.with_session(feed_id, |s| {
            info!(feed_id = %s.feed_id(), mode = %label, "Detection mode changed");
            s.set_detection_mode(mode_id);
            Ok(())
        })
    }

    fn index_of(&self, feed_id: &str) -> SessionResult<usize> {
        self.sessions
            .iter()
            .position(|s| s.feed_id() == feed_id)
            .ok_or_else(|| SessionError::UnknownFeed(feed_id.to_string()))
    }

    fn with_session<F>(&mut self, feed_id: &str, apply: F) -> SessionResult<()>
    where
        F: FnOnce(&mut PlaybackSession) -> SessionResult<()>,
    {
        let index = self.index_of(feed_id)?;
        let result = apply(&mut self.sessions[index]);
        self.flush(index);
        result
    }

    /// Sink reports for feeds that were deactivated are expected; drop them quietly.
    fn with_known_session<F>(&mut self, feed_id: &str, apply: F) -> SessionResult<()>
    where
        F: FnOnce(&mut PlaybackSession),
    {
        match self.index_of(feed_id) {
            Ok(index) => {
                apply(&mut self.sessions[index]);
                self.flush(index);
            }
            Err(_) => debug!(%feed_id, "Dropping sink report for inactive feed"),
        }
        Ok(())
    }

    fn flush(&mut self, index: usize) {
        for event in Self::session_events(&mut self.sessions[index]) {
            self.send_event(event);
        }
    }

    fn flush_session(&self, session: &mut PlaybackSession) {
        for event in Self::session_events(session) {
            self.send_event(event);
        }
    }

    /// Turn recorded transitions into UI events.
    fn session_events(session: &mut PlaybackSession) -> Vec<SessionEvent> {
        let feed_id = session.feed_id().to_string();
        let transitions = session.take_transitions();
        let changed = !transitions.is_empty();

        let mut events: Vec<_> = transitions
            .into_iter()
            .map(|t| SessionEvent::StateChanged {
                feed_id: feed_id.clone(),
                previous: t.previous,
                current: t.current,
            })
            .collect();

        if changed && session.state().is_error() {
            if let Some(error) = session.last_error() {
                events.push(SessionEvent::Error {
                    feed_id,
                    error: error.clone(),
                });
            }
        }
        events
    }

    fn teardown_all(&mut self) {
        for mut session in std::mem::take(&mut self.sessions) {
            session.teardown();
            self.flush_session(&mut session);
        }
    }

    fn send_event(&self, event: SessionEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use crate::ProbeConfig;
    use feedwatch_ipc::{
        command_channel, event_channel, LoadOutcome, LoadToken, PlaybackError, PlaybackState,
        SourceKind, COMMAND_CHANNEL_CAPACITY,
    };

    fn manager() -> (SessionManager, Receiver<SessionEvent>) {
        let (_, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();
        let factory = |_: &FeedConfig, _: SinkReporter| -> Box<dyn crate::MediaSink> {
            Box::new(RecordingSink::default())
        };
        (
            SessionManager::new(command_rx, event_tx, Box::new(factory)),
            event_rx,
        )
    }

    fn feed(id: &str, locator: &str, index: usize) -> FeedConfig {
        FeedConfig {
            feed_index: index,
            total_feeds: 2,
            ..FeedConfig::new(id, locator)
        }
    }

    fn drain(rx: &Receiver<SessionEvent>) -> Vec<SessionEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_two_feeds_live_and_file() {
        let (mut manager, events) = manager();
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", "rtsp://10.0.0.2/live", 0),
        });
        manager.handle_command(SessionCommand::Activate {
            feed: feed("2", "/videos/yard.mp4", 1),
        });

        for id in ["1", "2"] {
            let token = manager.session(id).unwrap().pending_token().unwrap();
            manager.handle_command(SessionCommand::LoadSettled {
                feed_id: id.to_string(),
                token,
                outcome: LoadOutcome::Ready,
            });
        }

        let views = manager.snapshot();
        assert_eq!(views[0].source_kind, SourceKind::LiveStream);
        assert_eq!(views[0].state, PlaybackState::Playing);
        assert!(views[0].live_badge && !views[0].looping);
        assert_eq!(views[1].source_kind, SourceKind::FileVideo);
        assert_eq!(views[1].state, PlaybackState::Paused);
        assert!(views[1].looping && !views[1].live_badge);

        let changes: Vec<_> = drain(&events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::StateChanged {
                    feed_id, current, ..
                } => Some((feed_id, current)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                ("1".to_string(), PlaybackState::Loading),
                ("2".to_string(), PlaybackState::Loading),
                ("1".to_string(), PlaybackState::Playing),
                ("2".to_string(), PlaybackState::Paused),
            ]
        );
    }

    #[test]
    fn test_error_event_carries_diagnostic() {
        let (mut manager, events) = manager();
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", "", 0),
        });

        let errors: Vec<_> = drain(&events)
            .into_iter()
            .filter_map(|e| match e {
                SessionEvent::Error { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![PlaybackError::NoSourceConfigured]);
    }

    #[test]
    fn test_unknown_feed_and_illegal_toggle_are_rejected() {
        let (mut manager, events) = manager();
        manager.handle_command(SessionCommand::Retry {
            feed_id: "9".to_string(),
        });
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", "rtsp://10.0.0.2/live", 0),
        });
        manager.handle_command(SessionCommand::TogglePlayback {
            feed_id: "1".to_string(),
        });

        let rejected = drain(&events)
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::CommandRejected { .. }))
            .count();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn test_results_for_deactivated_feed_are_dropped() {
        let (mut manager, events) = manager();
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", "rtsp://10.0.0.2/live", 0),
        });
        manager.handle_command(SessionCommand::Deactivate {
            feed_id: "1".to_string(),
        });
        drain(&events);

        manager.handle_command(SessionCommand::LoadSettled {
            feed_id: "1".to_string(),
            token: LoadToken(1),
            outcome: LoadOutcome::Ready,
        });

        assert!(drain(&events).is_empty());
        assert!(manager.session("1").is_none());
    }

    #[test]
    fn test_detection_mode_validated_against_catalog() {
        let (mut manager, events) = manager();
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", "rtsp://10.0.0.2/live", 0),
        });
        drain(&events);

        manager.handle_command(SessionCommand::ChangeDetectionMode {
            feed_id: "1".to_string(),
            mode_id: "vehicle".to_string(),
        });
        assert_eq!(manager.session("1").unwrap().view().detection_mode, "vehicle");

        manager.handle_command(SessionCommand::ChangeDetectionMode {
            feed_id: "1".to_string(),
            mode_id: "traffic".to_string(),
        });
        assert!(matches!(
            drain(&events).as_slice(),
            [SessionEvent::CommandRejected { .. }]
        ));
        assert_eq!(manager.session("1").unwrap().view().detection_mode, "vehicle");
    }

    #[test]
    fn test_shutdown_stops_loop() {
        let (mut manager, events) = manager();
        assert!(!manager.handle_command(SessionCommand::Shutdown));
        assert!(matches!(
            drain(&events).last(),
            Some(SessionEvent::Shutdown)
        ));
    }

    #[test]
    fn test_sink_results_survive_a_full_command_queue() {
        let (command_tx, command_rx) = command_channel();
        let (event_tx, _events) = event_channel();
        let queued = command_rx.clone();
        let mut manager = crate::create_manager(command_rx, event_tx, ProbeConfig::default());

        for _ in 0..COMMAND_CHANNEL_CAPACITY {
            command_tx.try_send(SessionCommand::GetSnapshot).unwrap();
        }
        assert!(command_tx.try_send(SessionCommand::GetSnapshot).is_err());

        let locator = concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml");
        manager.handle_command(SessionCommand::Activate {
            feed: feed("1", locator, 0),
        });
        for command in queued.try_iter() {
            manager.handle_command(command);
        }
        manager.apply_reports();

        let session = manager.session("1").unwrap();
        assert_eq!(session.state(), PlaybackState::Playing);
        assert_eq!(session.in_flight_loads(), 0);
    }
}
