//! Canonical detection events.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feed id assigned to events whose payload names no feed.
pub const UNKNOWN_FEED_ID: &str = "unknown";

/// Channel a detection payload arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceChannel {
    /// POSTed to the local ingestion path.
    Intercept,

    /// Received as a websocket frame.
    Socket,
}

impl SourceChannel {
    /// Label used when a payload carries no `event` field.
    pub fn default_event_name(self) -> &'static str {
        match self {
            Self::Intercept => "Detection event",
            Self::Socket => "Socket message",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Intercept => "intercept",
            Self::Socket => "socket",
        }
    }
}

/// A detection result, normalized independently of the channel it came from.
///
/// Ordering is by `sequence`, the position at which the bus received the
/// event. The `timestamp` field is producer-supplied display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionEvent {
    /// Bus receipt position, starting at 1.
    pub sequence: u64,

    pub channel: SourceChannel,

    pub feed_id: String,

    pub event_name: String,

    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    /// The payload as received, unrecognized keys included.
    pub raw: Value,

    pub received_at: DateTime<Local>,
}

impl DetectionEvent {
    /// Confidence as a whole percentage, for display.
    pub fn confidence_percent(&self) -> Option<u32> {
        self.confidence
            .filter(|c| c.is_finite())
            .map(|c| (c.clamp(0.0, 1.0) * 100.0).round() as u32)
    }

    /// True for frames that could not be parsed as a detection payload.
    pub fn is_raw_message(&self) -> bool {
        matches!(self.raw, Value::String(_))
    }
}
