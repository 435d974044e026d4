//! Commands sent to the session manager.

use serde::{Deserialize, Serialize};

use crate::state::{LoadOutcome, MediaFailure};
use crate::types::{FeedConfig, LoadToken};

/// Commands that the operator UI and the media sinks can send to the
/// session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionCommand {
    /// Start supervising a feed (mounts a playback session).
    Activate { feed: FeedConfig },

    /// Stop supervising a feed and drop its session.
    Deactivate { feed_id: String },

    /// Point a feed at a new locator.
    SetLocator { feed_id: String, locator: String },

    /// Operator asked to retry loading a feed.
    Retry { feed_id: String },

    /// Operator toggled play/pause.
    TogglePlayback { feed_id: String },

    /// The mode selector changed a feed's detection mode.
    ChangeDetectionMode { feed_id: String, mode_id: String },

    /// A sink finished a load attempt.
    LoadSettled {
        feed_id: String,
        token: LoadToken,
        outcome: LoadOutcome,
    },

    /// The platform refused to start playback without a user gesture.
    AutoplayRejected { feed_id: String, token: LoadToken },

    /// Playback failed after the load had succeeded.
    MediaFailed {
        feed_id: String,
        token: LoadToken,
        failure: MediaFailure,
        detail: String,
    },

    /// Request a snapshot of every session.
    GetSnapshot,

    /// Shut the manager down.
    Shutdown,
}

impl SessionCommand {
    /// Feed the command targets, if any.
    pub fn feed_id(&self) -> Option<&str> {
        match self {
            Self::Activate { feed } => Some(&feed.id),
            Self::Deactivate { feed_id }
            | Self::SetLocator { feed_id, .. }
            | Self::Retry { feed_id }
            | Self::TogglePlayback { feed_id }
            | Self::ChangeDetectionMode { feed_id, .. }
            | Self::LoadSettled { feed_id, .. }
            | Self::AutoplayRejected { feed_id, .. }
            | Self::MediaFailed { feed_id, .. } => Some(feed_id),
            Self::GetSnapshot | Self::Shutdown => None,
        }
    }
}
