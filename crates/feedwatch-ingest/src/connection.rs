//! Connection state management.

use serde::{Deserialize, Serialize};

/// Connection state for the socket adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,

    /// Handshake in progress.
    Connecting,

    /// Connected and receiving frames.
    Connected,

    /// The transport failed. The operator decides when to reconnect.
    Errored { reason: String },
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if an attempt is open (connecting or connected).
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Check if errored.
    pub fn is_errored(&self) -> bool {
        matches!(self, Self::Errored { .. })
    }

    /// Get status message for UI.
    pub fn message(&self) -> String {
        match self {
            Self::Disconnected => "Disconnected".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Connected => "Connected".to_string(),
            Self::Errored { reason } => format!("Connection error: {}", reason),
        }
    }
}

/// Status notification published on every socket state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    /// Endpoint the adapter is configured for.
    pub endpoint: String,

    /// Previous state.
    pub previous: ConnectionState,

    /// Current state.
    pub current: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Errored {
            reason: "refused".to_string()
        }
        .is_active());
    }

    #[test]
    fn test_error_message_includes_reason() {
        let state = ConnectionState::Errored {
            reason: "connection refused".to_string(),
        };
        assert!(state.is_errored());
        assert_eq!(state.message(), "Connection error: connection refused");
    }
}
