//! Per-feed playback session state machine.

use tracing::{debug, info, instrument, warn};

use feedwatch_ipc::{
    FeedConfig, LoadOutcome, LoadToken, MediaFailure, PlaybackError, PlaybackState, SessionView,
    SourceKind,
};

use crate::classifier::classify;
use crate::error::SessionError;
use crate::sink::{LoadRequest, MediaSink};
use crate::SessionResult;

/// A recorded state change, drained by the manager and forwarded to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub previous: PlaybackState,
    pub current: PlaybackState,
}

/// Playback supervisor for one displayed feed.
///
/// At most one load is in flight at a time. Starting a new load cancels the
/// previous one at the sink, and any result that still arrives for it is
/// recognised by its token and ignored.
pub struct PlaybackSession {
    feed: FeedConfig,
    source_kind: SourceKind,
    state: PlaybackState,
    last_error: Option<PlaybackError>,
    retry_count: u32,
    next_token: u64,
    in_flight: Option<LoadToken>,
    loaded: Option<LoadToken>,
    sink: Box<dyn MediaSink>,
    transitions: Vec<Transition>,
}

impl PlaybackSession {
    /// Create an idle session. Nothing is loaded until [`mount`](Self::mount).
    pub fn new(feed: FeedConfig, sink: Box<dyn MediaSink>) -> Self {
        let source_kind = classify(&feed.locator);
        Self {
            feed,
            source_kind,
            state: PlaybackState::Idle,
            last_error: None,
            retry_count: 0,
            next_token: 0,
            in_flight: None,
            loaded: None,
            sink,
            transitions: Vec::new(),
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed.id
    }

    pub fn feed(&self) -> &FeedConfig {
        &self.feed
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn source_kind(&self) -> SourceKind {
        self.source_kind
    }

    pub fn last_error(&self) -> Option<&PlaybackError> {
        self.last_error.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Number of load attempts currently awaiting a result (0 or 1).
    pub fn in_flight_loads(&self) -> usize {
        usize::from(self.in_flight.is_some())
    }

    /// Token of the load whose result the session is waiting for.
    pub fn pending_token(&self) -> Option<LoadToken> {
        self.in_flight
    }

    /// Issue the first load.
    #[instrument(name = "session_mount", skip(self), fields(feed_id = %self.feed.id))]
    pub fn mount(&mut self) {
        info!(kind = self.source_kind.name(), "Mounting session");
        self.begin_load(false);
    }

    /// Point the session at a new locator. Returns false if it was unchanged.
    ///
    /// A new locator clears the retry count and supersedes any in-flight load.
    #[instrument(
        name = "session_set_locator",
        skip(self, locator),
        fields(feed_id = %self.feed.id)
    )]
    pub fn set_locator(&mut self, locator: impl Into<String>) -> bool {
        let locator = locator.into();
        if locator == self.feed.locator {
            debug!("Locator unchanged, ignoring");
            return false;
        }

        self.feed.locator = locator;
        self.source_kind = classify(&self.feed.locator);
        self.retry_count = 0;
        info!(kind = self.source_kind.name(), "Locator changed");

        self.unload_current();
        self.transition_to(PlaybackState::Idle);
        self.begin_load(false);
        true
    }

    /// Reload the source on operator request, even if nothing changed.
    #[instrument(name = "session_retry", skip(self), fields(feed_id = %self.feed.id))]
    pub fn retry(&mut self) {
        self.retry_count += 1;
        info!(attempt = self.retry_count, "Retrying");
        self.transition_to(PlaybackState::Retrying);
        self.begin_load(true);
    }

    fn begin_load(&mut self, force_reload: bool) {
        if let Some(stale) = self.in_flight.take() {
            debug!(token = %stale, "Superseding in-flight load");
            self.sink.cancel(stale);
        }
        self.loaded = None;
        self.last_error = None;

        if self.feed.locator.trim().is_empty() {
            warn!(feed_id = %self.feed.id, "No source configured");
            self.last_error = Some(PlaybackError::NoSourceConfigured);
            self.transition_to(PlaybackState::Error);
            return;
        }

        self.next_token += 1;
        let token = LoadToken(self.next_token);
        self.in_flight = Some(token);
        self.transition_to(PlaybackState::Loading);

        let request = LoadRequest {
            token,
            locator: self.feed.locator.clone(),
            kind: self.source_kind,
            looping: self.source_kind.loops(),
            force_reload,
        };
        debug!(%token, force_reload, "Issuing load");
        self.sink.load(&request);
    }

    /// Apply a load result. Returns false if the result was stale.
    pub fn load_settled(&mut self, token: LoadToken, outcome: LoadOutcome) -> bool {
        if self.in_flight != Some(token) {
            debug!(feed_id = %self.feed.id, %token, "Ignoring stale load result");
            return false;
        }
        self.in_flight = None;

        match outcome {
            LoadOutcome::Ready => {
                self.loaded = Some(token);
                match self.source_kind {
                    SourceKind::LiveStream => {
                        self.sink.play(token, true);
                        self.transition_to(PlaybackState::Playing);
                    }
                    SourceKind::FileVideo => self.transition_to(PlaybackState::Paused),
                    SourceKind::StaticImage => self.transition_to(PlaybackState::Playing),
                }
            }
            LoadOutcome::Failed { failure, detail } => self.fail(failure, detail),
        }
        true
    }

    /// The platform refused to autoplay. Returns false if it did not apply.
    ///
    /// This is not an error: the source is fine and will play on a gesture.
    pub fn autoplay_rejected(&mut self, token: LoadToken) -> bool {
        if self.loaded != Some(token) || self.state != PlaybackState::Playing {
            debug!(feed_id = %self.feed.id, %token, "Ignoring autoplay rejection");
            return false;
        }
        info!(feed_id = %self.feed.id, "Autoplay blocked, waiting for user gesture");
        self.transition_to(PlaybackState::AutoplayBlocked);
        true
    }

    /// Playback of loaded media failed. Returns false if it did not apply.
    pub fn media_failed(
        &mut self,
        token: LoadToken,
        failure: MediaFailure,
        detail: String,
    ) -> bool {
        if self.loaded != Some(token) {
            debug!(feed_id = %self.feed.id, %token, "Ignoring stale media failure");
            return false;
        }
        self.loaded = None;
        self.fail(failure, detail);
        true
    }

    fn fail(&mut self, failure: MediaFailure, detail: String) {
        let error = PlaybackError::Media { failure, detail };
        warn!(feed_id = %self.feed.id, "{}", error.message());
        self.last_error = Some(error);
        self.transition_to(PlaybackState::Error);
    }

    /// Explicit user play/pause.
    pub fn toggle_playback(&mut self) -> SessionResult<PlaybackState> {
        if !self.source_kind.is_playable() {
            return Err(SessionError::NotPlayable(self.feed.id.clone()));
        }

        let token = match (self.loaded, self.state.can_toggle()) {
            (Some(token), true) => token,
            _ => {
                return Err(SessionError::InvalidTransition {
                    feed_id: self.feed.id.clone(),
                    action: "toggle playback of",
                    state: self.state.name(),
                })
            }
        };

        if self.state.is_playing() {
            self.sink.pause(token);
            self.transition_to(PlaybackState::Paused);
        } else {
            self.sink.play(token, false);
            self.transition_to(PlaybackState::Playing);
        }
        Ok(self.state)
    }

    pub fn set_detection_mode(&mut self, mode_id: impl Into<String>) {
        self.feed.detection_mode = mode_id.into();
    }

    /// Release the source and drop interest in any pending result.
    #[instrument(name = "session_teardown", skip(self), fields(feed_id = %self.feed.id))]
    pub fn teardown(&mut self) {
        self.unload_current();
        self.transition_to(PlaybackState::Idle);
    }

    fn unload_current(&mut self) {
        if let Some(stale) = self.in_flight.take() {
            self.sink.cancel(stale);
        }
        self.loaded = None;
        self.sink.unload();
    }

    /// What the rendering layer shows for this feed.
    pub fn view(&self) -> SessionView {
        SessionView {
            feed_id: self.feed.id.clone(),
            name: self.feed.name.clone(),
            source_kind: self.source_kind,
            state: self.state,
            last_error: self.last_error.clone(),
            retry_count: self.retry_count,
            live_badge: self.source_kind == SourceKind::LiveStream,
            looping: self.source_kind.loops(),
            detection_mode: self.feed.detection_mode.clone(),
        }
    }

    /// Take the transitions recorded since the last call.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    fn transition_to(&mut self, new_state: PlaybackState) {
        let previous = std::mem::replace(&mut self.state, new_state);
        if previous == new_state {
            return;
        }

        debug!(
            feed_id = %self.feed.id,
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );
        self.transitions.push(Transition {
            previous,
            current: new_state,
        });
    }
}
