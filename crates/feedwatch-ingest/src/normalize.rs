//! Payload normalization into canonical detection events.

use chrono::{DateTime, Local};
use serde_json::{Map, Value};

use feedwatch_ipc::{DetectionEvent, SourceChannel, UNKNOWN_FEED_ID};

/// Event name given to frames that are not detection payloads.
pub const RAW_MESSAGE_EVENT: &str = "Raw message";

/// Display format for defaulted timestamps.
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// A payload as an adapter received it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Parsed JSON.
    Json(Value),

    /// Text that is not JSON.
    Unparsed(String),
}

impl RawPayload {
    /// Parse text as JSON, keeping it verbatim if that fails.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Unparsed(text.to_string()),
        }
    }
}

/// Build the canonical event for a payload received at `received_at`.
pub fn normalize(
    payload: RawPayload,
    channel: SourceChannel,
    sequence: u64,
    received_at: DateTime<Local>,
) -> DetectionEvent {
    let fields = match payload {
        RawPayload::Json(Value::Object(fields)) => fields,
        RawPayload::Json(other) => {
            return raw_message(other.to_string(), channel, sequence, received_at)
        }
        RawPayload::Unparsed(text) => return raw_message(text, channel, sequence, received_at),
    };

    DetectionEvent {
        sequence,
        channel,
        feed_id: feed_id(&fields),
        event_name: string_field(&fields, "event")
            .unwrap_or_else(|| channel.default_event_name().to_string()),
        timestamp: string_field(&fields, "timestamp")
            .unwrap_or_else(|| received_at.format(TIMESTAMP_FORMAT).to_string()),
        confidence: fields.get("confidence").and_then(Value::as_f64),
        raw: Value::Object(fields),
        received_at,
    }
}

fn raw_message(
    text: String,
    channel: SourceChannel,
    sequence: u64,
    received_at: DateTime<Local>,
) -> DetectionEvent {
    DetectionEvent {
        sequence,
        channel,
        feed_id: UNKNOWN_FEED_ID.to_string(),
        event_name: RAW_MESSAGE_EVENT.to_string(),
        timestamp: received_at.format(TIMESTAMP_FORMAT).to_string(),
        confidence: None,
        raw: Value::String(text),
        received_at,
    }
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn feed_id(fields: &Map<String, Value>) -> String {
    match fields.get("feedId") {
        Some(Value::String(id)) if !id.trim().is_empty() => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => UNKNOWN_FEED_ID.to_string(),
    }
}
