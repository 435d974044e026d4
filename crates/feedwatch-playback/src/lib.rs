//! Feed playback supervision.
//!
//! This crate classifies feed locators and drives one playback state
//! machine per displayed feed, reconciling load failures, retries and
//! autoplay refusals.

mod classifier;
mod error;
mod manager;
mod probe;
mod session;
mod sink;

#[cfg(test)]
mod testing;

pub use classifier::{classify, STREAM_HINTS, STREAM_SCHEMES, VIDEO_EXTENSIONS};
pub use error::SessionError;
pub use manager::SessionManager;
pub use probe::{ProbeConfig, ProbeSink, ProbeSinkFactory, DEFAULT_PROBE_TIMEOUT};
pub use session::{PlaybackSession, Transition};
pub use sink::{LoadRequest, MediaSink, SinkFactory, SinkReporter};

use crossbeam_channel::{Receiver, Sender};

use feedwatch_ipc::{SessionCommand, SessionEvent};

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Create a session manager that probes sources with [`ProbeSink`].
pub fn create_manager(
    command_rx: Receiver<SessionCommand>,
    event_tx: Sender<SessionEvent>,
    probe: ProbeConfig,
) -> SessionManager {
    SessionManager::new(command_rx, event_tx, Box::new(ProbeSinkFactory { config: probe }))
}
