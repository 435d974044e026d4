//! Playback state machine types.

use serde::{Deserialize, Serialize};

/// The current state of a playback session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Mounted, nothing requested yet.
    #[default]
    Idle,

    /// A load attempt is in flight.
    Loading,

    /// Media is playing (or, for still images, displayed).
    Playing,

    /// Media is loaded and paused.
    Paused,

    /// The platform refused to autoplay; a user gesture will start it.
    AutoplayBlocked,

    /// The last load or playback attempt failed.
    Error,

    /// A retry was requested and the reload is being issued.
    Retrying,
}

impl PlaybackState {
    /// Returns true if the session is waiting on a load.
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::Retrying)
    }

    /// Returns true if the session is playing.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Returns true if the session is in the error state.
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns true if an explicit play/pause toggle is legal.
    pub fn can_toggle(self) -> bool {
        matches!(self, Self::Playing | Self::Paused | Self::AutoplayBlocked)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Loading => "Loading",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
            Self::AutoplayBlocked => "AutoplayBlocked",
            Self::Error => "Error",
            Self::Retrying => "Retrying",
        }
    }
}

/// Why the media sink could not load or play a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFailure {
    /// The source could not be reached.
    NetworkUnreachable,

    /// The container or codec is not supported.
    UnsupportedFormat,

    /// The media was reachable but could not be decoded.
    DecodeError,

    /// The source was blocked by a security or cross-origin policy.
    SecurityBlocked,
}

impl MediaFailure {
    /// Returns the human-readable diagnostic for this failure.
    pub fn message(self) -> &'static str {
        match self {
            Self::NetworkUnreachable => {
                "Network error: the video source could not be reached"
            }
            Self::UnsupportedFormat => {
                "Format not supported: the video format or codec cannot be played"
            }
            Self::DecodeError => "Decode error: the video data is corrupted or incomplete",
            Self::SecurityBlocked => {
                "Access blocked: the source refused the request (security or CORS policy)"
            }
        }
    }
}

/// Diagnostic stored as a session's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackError {
    /// The feed has no locator; nothing was loaded.
    NoSourceConfigured,

    /// The sink failed to load or play the source.
    Media { failure: MediaFailure, detail: String },
}

impl PlaybackError {
    /// Returns true for configuration problems rather than load failures.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NoSourceConfigured)
    }

    /// Returns a display message for this error.
    pub fn message(&self) -> String {
        match self {
            Self::NoSourceConfigured => {
                "No video source configured: set a locator for this feed in the settings"
                    .to_string()
            }
            Self::Media { failure, detail } if detail.is_empty() => failure.message().to_string(),
            Self::Media { failure, detail } => format!("{} ({detail})", failure.message()),
        }
    }
}

/// Result a sink reports when a load attempt finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOutcome {
    /// The source is ready to play.
    Ready,

    /// The source failed to load.
    Failed { failure: MediaFailure, detail: String },
}
