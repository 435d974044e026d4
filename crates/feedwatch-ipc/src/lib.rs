//! Typed messages for the feedwatch monitor.
//!
//! This crate defines the message types shared between the playback
//! session manager, the detection ingestion bus, and the operator front end.

mod commands;
mod detection;
mod events;
mod modes;
mod state;
mod types;

pub use commands::SessionCommand;
pub use detection::{DetectionEvent, SourceChannel, UNKNOWN_FEED_ID};
pub use events::SessionEvent;
pub use modes::{DetectionMode, ModeCatalog, ModeError};
pub use state::{LoadOutcome, MediaFailure, PlaybackError, PlaybackState};
pub use types::{FeedConfig, LoadToken, SessionView, SourceKind};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for commands (UI → session manager).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (session manager → UI).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded command channel.
pub fn command_channel() -> (Sender<SessionCommand>, Receiver<SessionCommand>) {
    crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY)
}

/// Creates a bounded event channel.
pub fn event_channel() -> (Sender<SessionEvent>, Receiver<SessionEvent>) {
    crossbeam_channel::bounded(EVENT_CHANNEL_CAPACITY)
}
