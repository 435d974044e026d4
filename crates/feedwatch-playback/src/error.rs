//! Error types for the playback module.

use thiserror::Error;

use feedwatch_ipc::ModeError;

/// Errors returned by session and manager operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session exists for the feed.
    #[error("Unknown feed: {0}")]
    UnknownFeed(String),

    /// A session already exists for the feed.
    #[error("Feed already active: {0}")]
    DuplicateFeed(String),

    /// The command is not legal in the session's current state.
    #[error("Cannot {action} feed {feed_id} while {state}")]
    InvalidTransition {
        feed_id: String,
        action: &'static str,
        state: &'static str,
    },

    /// The feed shows a still image and has no playback controls.
    #[error("Feed {0} is a still image and cannot be played or paused")]
    NotPlayable(String),

    /// Detection mode lookup failed.
    #[error(transparent)]
    Mode(#[from] ModeError),
}
