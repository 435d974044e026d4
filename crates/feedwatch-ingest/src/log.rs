//! Append-only event log fed by the bus.

use std::sync::Arc;

use parking_lot::Mutex;

use feedwatch_ipc::DetectionEvent;

use crate::bus::{EventBus, SubscriptionId};

/// Ordered record of every event delivered since attachment.
pub struct EventLog {
    bus: EventBus,
    subscription: Option<SubscriptionId>,
    entries: Arc<Mutex<Vec<DetectionEvent>>>,
}

impl EventLog {
    /// Subscribe a new log to `bus`.
    pub fn attach(bus: &EventBus) -> Self {
        let entries = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&entries);
        let subscription = bus.subscribe(move |event| sink.lock().push(event.clone()));

        Self {
            bus: bus.clone(),
            subscription: Some(subscription),
            entries,
        }
    }

    /// Stop receiving events. Entries already recorded are kept.
    pub fn detach(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.bus.unsubscribe(id);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// All entries in delivery order.
    pub fn entries(&self) -> Vec<DetectionEvent> {
        self.entries.lock().clone()
    }

    /// The newest `n` entries, oldest first. This is the auto-scrolled view.
    pub fn tail(&self, n: usize) -> Vec<DetectionEvent> {
        let entries = self.entries.lock();
        let start = entries.len().saturating_sub(n);
        entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Render an entry as a single log line.
pub fn format_entry(event: &DetectionEvent) -> String {
    let mut line = format!(
        "[{}] feed {}: {}",
        event.timestamp, event.feed_id, event.event_name
    );
    if let Some(percent) = event.confidence_percent() {
        line.push_str(&format!(" ({}%)", percent));
    }
    if let serde_json::Value::String(text) = &event.raw {
        line.push_str(&format!(" {:?}", text));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::RawPayload;
    use feedwatch_ipc::SourceChannel;
    use serde_json::json;

    #[test]
    fn test_log_keeps_cross_channel_order() {
        let bus = EventBus::new();
        let log = EventLog::attach(&bus);

        bus.publish(
            RawPayload::Json(json!({"event": "Vehicle detected", "feedId": "2"})),
            SourceChannel::Socket,
        );
        bus.publish(
            RawPayload::Json(json!({"event": "Person detected", "feedId": "1"})),
            SourceChannel::Intercept,
        );

        let feeds: Vec<String> = log.entries().into_iter().map(|e| e.feed_id).collect();
        assert_eq!(feeds, vec!["2", "1"]);
        assert_eq!(log.tail(1)[0].feed_id, "1");
        assert_eq!(log.tail(10).len(), 2);
    }

    #[test]
    fn test_detach_stops_recording() {
        let bus = EventBus::new();
        let mut log = EventLog::attach(&bus);
        bus.publish(RawPayload::parse("{}"), SourceChannel::Socket);

        log.detach();
        assert!(!log.is_attached());
        bus.publish(RawPayload::parse("{}"), SourceChannel::Socket);

        assert_eq!(log.len(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_format_entry() {
        let bus = EventBus::new();
        let log = EventLog::attach(&bus);
        bus.publish(
            RawPayload::Json(json!({
                "event": "Person detected",
                "feedId": "1",
                "timestamp": "14:35:22",
                "confidence": 0.95
            })),
            SourceChannel::Intercept,
        );
        bus.publish(RawPayload::parse("hello"), SourceChannel::Socket);

        let entries = log.entries();
        assert_eq!(
            format_entry(&entries[0]),
            "[14:35:22] feed 1: Person detected (95%)"
        );
        assert!(format_entry(&entries[1]).ends_with("feed unknown: Raw message \"hello\""));
    }
}
