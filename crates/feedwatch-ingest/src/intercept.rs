//! Request interception for the local detection path.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use feedwatch_ipc::SourceChannel;

use crate::bus::EventBus;
use crate::error::IngestError;
use crate::normalize::RawPayload;
use crate::IngestResult;

/// Path detection producers POST to.
pub const DEFAULT_INTERCEPT_PATH: &str = "/detection_output";

/// A request on its way to the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: String,

    /// Absolute URL or origin-relative path with optional query.
    pub target: String,

    pub body: Bytes,
}

impl OutboundRequest {
    pub fn post(target: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: "POST".to_string(),
            target: target.into(),
            body: body.into(),
        }
    }

    /// Path component of the target, without scheme, host, query or fragment.
    pub fn path(&self) -> String {
        if self.target.contains("://") {
            if let Ok(url) = Url::parse(&self.target) {
                return url.path().to_string();
            }
        }
        let end = self
            .target
            .find(['?', '#'])
            .unwrap_or(self.target.len());
        self.target[..end].to_string()
    }
}

/// Response handed back in place of a network round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticResponse {
    pub status: u16,
    pub body: Value,
}

impl SyntheticResponse {
    pub fn detection_received() -> Self {
        Self {
            status: 200,
            body: json!({"success": true, "message": "Detection received"}),
        }
    }
}

/// What became of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum InterceptOutcome {
    /// Consumed. The caller sees this response.
    Intercepted(SyntheticResponse),

    /// Not ours. The request is returned untouched.
    PassThrough(OutboundRequest),
}

/// Turns POSTs to the configured path into bus events.
pub struct InterceptAdapter {
    path: String,
    armed: AtomicBool,
    bus: EventBus,
}

impl InterceptAdapter {
    /// Create an armed adapter for `path`.
    pub fn new(path: impl Into<String>, bus: EventBus) -> IngestResult<Self> {
        let path = path.into();
        if !path.starts_with('/') || path.contains(['?', '#']) {
            return Err(IngestError::InvalidPath(path));
        }

        info!(%path, "Intercept adapter armed");
        Ok(Self {
            path,
            armed: AtomicBool::new(true),
            bus,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn arm(&self) {
        if !self.armed.swap(true, Ordering::SeqCst) {
            info!(path = %self.path, "Intercept adapter armed");
        }
    }

    /// Restore pass-through. Takes effect for the next request handled.
    pub fn disarm(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            info!(path = %self.path, "Intercept adapter disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Whether `request` would be intercepted right now.
    pub fn matches(&self, request: &OutboundRequest) -> bool {
        self.is_armed()
            && request.method.eq_ignore_ascii_case("POST")
            && request.path() == self.path
    }

    /// Intercept or pass through a request. Each request takes exactly one
    /// of the two routes.
    pub fn handle(&self, request: OutboundRequest) -> InterceptOutcome {
        if !self.matches(&request) {
            debug!(method = %request.method, target = %request.target, "Passing request through");
            return InterceptOutcome::PassThrough(request);
        }

        match serde_json::from_slice::<Value>(&request.body) {
            Ok(payload @ Value::Object(_)) => {
                let sequence = self
                    .bus
                    .publish(RawPayload::Json(payload), SourceChannel::Intercept);
                debug!(sequence, "Intercepted detection");
            }
            Ok(other) => {
                warn!(body = %other, "Ignoring intercepted body that is not an object");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    body = %String::from_utf8_lossy(&request.body),
                    "Ignoring malformed intercepted body"
                );
            }
        }

        InterceptOutcome::Intercepted(SyntheticResponse::detection_received())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> (InterceptAdapter, crossbeam_channel::Receiver<feedwatch_ipc::DetectionEvent>) {
        let bus = EventBus::new();
        let (_, rx) = bus.subscribe_channel();
        (InterceptAdapter::new(DEFAULT_INTERCEPT_PATH, bus).unwrap(), rx)
    }

    #[test]
    fn test_matching_post_is_intercepted() {
        let (adapter, rx) = adapter();
        let body =
            r#"{"event":"Person detected","feedId":"1","timestamp":"14:35:22","confidence":0.95}"#;

        let outcome = adapter.handle(OutboundRequest::post(
            "http://localhost:5173/detection_output",
            body,
        ));

        assert_eq!(
            outcome,
            InterceptOutcome::Intercepted(SyntheticResponse::detection_received())
        );
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_name, "Person detected");
        assert_eq!(events[0].feed_id, "1");
        assert_eq!(events[0].timestamp, "14:35:22");
        assert_eq!(events[0].confidence, Some(0.95));
        assert_eq!(events[0].channel, SourceChannel::Intercept);
    }

    #[test]
    fn test_other_requests_pass_through() {
        let (adapter, rx) = adapter();

        let other_path = OutboundRequest::post("/api/other", "{}");
        assert_eq!(
            adapter.handle(other_path.clone()),
            InterceptOutcome::PassThrough(other_path)
        );

        let get = OutboundRequest {
            method: "GET".to_string(),
            target: "/detection_output".to_string(),
            body: Bytes::new(),
        };
        assert!(matches!(adapter.handle(get), InterceptOutcome::PassThrough(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_path_match_ignores_host_and_query() {
        let (adapter, _rx) = adapter();
        assert!(adapter.matches(&OutboundRequest::post(
            "https://cams.example:9000/detection_output?x=1",
            ""
        )));
        assert!(adapter.matches(&OutboundRequest::post("/detection_output#frag", "")));
        assert!(!adapter.matches(&OutboundRequest::post("/detection_output/extra", "")));
    }

    #[test]
    fn test_malformed_body_is_swallowed() {
        let (adapter, rx) = adapter();

        for body in ["not json", "[1,2,3]", ""] {
            let outcome = adapter.handle(OutboundRequest::post("/detection_output", body));
            assert_eq!(
                outcome,
                InterceptOutcome::Intercepted(SyntheticResponse::detection_received())
            );
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disarm_restores_pass_through() {
        let (adapter, rx) = adapter();
        let request = OutboundRequest::post("/detection_output", r#"{"feedId":"1"}"#);

        adapter.disarm();
        assert!(!adapter.is_armed());
        assert_eq!(
            adapter.handle(request.clone()),
            InterceptOutcome::PassThrough(request.clone())
        );
        assert!(rx.try_recv().is_err());

        adapter.arm();
        assert!(matches!(adapter.handle(request), InterceptOutcome::Intercepted(_)));
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_invalid_path_rejected() {
        assert!(matches!(
            InterceptAdapter::new("detection_output", EventBus::new()),
            Err(IngestError::InvalidPath(_))
        ));
    }
}
