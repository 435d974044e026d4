//! Common types used across IPC messages.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::state::{PlaybackError, PlaybackState};

/// A feed the operator wants to watch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedConfig {
    /// Feed identifier, matched against `feedId` in detection payloads.
    pub id: String,

    /// Display name for the UI.
    pub name: String,

    /// Source locator (asset path, file URL or stream URL).
    #[serde(default)]
    pub locator: String,

    /// Selected detection mode identifier.
    #[serde(default)]
    pub detection_mode: String,

    /// Number of feeds shown side by side.
    #[serde(default = "default_total_feeds")]
    pub total_feeds: usize,

    /// Position of this feed in the grid.
    #[serde(default)]
    pub feed_index: usize,
}

fn default_total_feeds() -> usize {
    1
}

impl FeedConfig {
    /// Create a feed with default display settings.
    pub fn new(id: impl Into<String>, locator: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: format!("Camera {id}"),
            id,
            locator: locator.into(),
            detection_mode: String::new(),
            total_feeds: 1,
            feed_index: 0,
        }
    }
}

/// What kind of media a locator points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// A still image; no playback controls.
    StaticImage,

    /// A video file; loops, not autoplayed.
    FileVideo,

    /// A network stream; autoplayed, never loops.
    LiveStream,
}

impl SourceKind {
    /// Whether playback restarts at end of media.
    pub fn loops(self) -> bool {
        matches!(self, Self::FileVideo)
    }

    /// Whether playback starts without a user gesture.
    pub fn autoplays(self) -> bool {
        matches!(self, Self::LiveStream)
    }

    /// Whether the session has play/pause controls at all.
    pub fn is_playable(self) -> bool {
        !matches!(self, Self::StaticImage)
    }

    /// Returns a simple string representation.
    pub fn name(self) -> &'static str {
        match self {
            Self::StaticImage => "image",
            Self::FileVideo => "file",
            Self::LiveStream => "live",
        }
    }
}

/// Identifies one load attempt of one session.
///
/// Sinks echo the token back with their result so that results of
/// superseded attempts can be recognised and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadToken(pub u64);

impl fmt::Display for LoadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the rendering layer reads for one feed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub feed_id: String,
    pub name: String,
    pub source_kind: SourceKind,
    pub state: PlaybackState,
    pub last_error: Option<PlaybackError>,
    pub retry_count: u32,
    /// Show the LIVE badge.
    pub live_badge: bool,
    pub looping: bool,
    pub detection_mode: String,
}
