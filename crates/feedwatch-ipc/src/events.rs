//! Events sent from the session manager to the UI.

use serde::{Deserialize, Serialize};

use crate::state::{PlaybackError, PlaybackState};
use crate::types::SessionView;

/// Events that the session manager sends to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A session changed state.
    StateChanged {
        /// Feed the session belongs to.
        feed_id: String,

        /// Previous state.
        previous: PlaybackState,

        /// Current state.
        current: PlaybackState,
    },

    /// A session entered the error state.
    Error {
        /// Feed the session belongs to.
        feed_id: String,

        /// Diagnostic for the error panel.
        error: PlaybackError,
    },

    /// A command was refused (unknown feed, illegal toggle, unknown mode).
    CommandRejected {
        /// Feed the command targeted, if any.
        feed_id: Option<String>,

        /// Why it was refused.
        message: String,
    },

    /// A session was torn down.
    SessionClosed { feed_id: String },

    /// Snapshot of every session, in feed order.
    Snapshot(Vec<SessionView>),

    /// Manager is ready to accept commands.
    Ready,

    /// Manager has shut down.
    Shutdown,
}
