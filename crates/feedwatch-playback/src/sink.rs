//! Media sink abstraction.

use crossbeam_channel::Sender;
use tracing::warn;

use feedwatch_ipc::{FeedConfig, LoadOutcome, LoadToken, MediaFailure, SessionCommand, SourceKind};

/// A load the session asks its sink to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Token the result must be reported with.
    pub token: LoadToken,

    pub locator: String,

    pub kind: SourceKind,

    /// Restart at end of media.
    pub looping: bool,

    /// Reload from the source even if the locator is unchanged.
    pub force_reload: bool,
}

/// The element that actually renders a feed.
///
/// Calls never block. Results of `load` and failures during playback are
/// reported later through the sink's [`SinkReporter`].
pub trait MediaSink: Send {
    /// Begin loading a source.
    fn load(&mut self, request: &LoadRequest);

    /// Stop caring about an in-flight load.
    fn cancel(&mut self, token: LoadToken);

    /// Start playback. `autoplay` is true when no user gesture is involved.
    fn play(&mut self, token: LoadToken, autoplay: bool);

    /// Pause playback.
    fn pause(&mut self, token: LoadToken);

    /// Release the source.
    fn unload(&mut self);
}

/// Creates one sink per mounted feed.
pub trait SinkFactory: Send {
    fn create(&self, feed: &FeedConfig, reporter: SinkReporter) -> Box<dyn MediaSink>;
}

impl<F> SinkFactory for F
where
    F: Fn(&FeedConfig, SinkReporter) -> Box<dyn MediaSink> + Send,
{
    fn create(&self, feed: &FeedConfig, reporter: SinkReporter) -> Box<dyn MediaSink> {
        self(feed, reporter)
    }
}

/// Posts sink results back to the session manager's report queue.
#[derive(Debug, Clone)]
pub struct SinkReporter {
    feed_id: String,
    command_tx: Sender<SessionCommand>,
}

impl SinkReporter {
    pub fn new(feed_id: impl Into<String>, command_tx: Sender<SessionCommand>) -> Self {
        Self {
            feed_id: feed_id.into(),
            command_tx,
        }
    }

    pub fn feed_id(&self) -> &str {
        &self.feed_id
    }

    /// Report that a load finished.
    pub fn load_settled(&self, token: LoadToken, outcome: LoadOutcome) {
        self.send(SessionCommand::LoadSettled {
            feed_id: self.feed_id.clone(),
            token,
            outcome,
        });
    }

    /// Report that autoplay was refused by policy.
    pub fn autoplay_rejected(&self, token: LoadToken) {
        self.send(SessionCommand::AutoplayRejected {
            feed_id: self.feed_id.clone(),
            token,
        });
    }

    /// Report a failure after the load succeeded.
    pub fn media_failed(&self, token: LoadToken, failure: MediaFailure, detail: impl Into<String>) {
        self.send(SessionCommand::MediaFailed {
            feed_id: self.feed_id.clone(),
            token,
            failure,
            detail: detail.into(),
        });
    }

    fn send(&self, command: SessionCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            warn!(feed_id = %self.feed_id, "Session manager gone, sink result dropped: {}", e);
        }
    }
}
