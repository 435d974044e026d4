//! Error types for the ingest module.

use thiserror::Error;

/// Errors that can occur while setting up or driving an ingestion channel.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Invalid websocket endpoint.
    #[error("Invalid socket endpoint: {0}")]
    InvalidEndpoint(String),

    /// Invalid intercept path.
    #[error("Invalid intercept path: {0}")]
    InvalidPath(String),

    /// A connection attempt is already active.
    #[error("Already connected")]
    AlreadyConnected,

    /// The adapter was torn down and accepts no further commands.
    #[error("Adapter has been torn down")]
    TornDown,

    /// The ingestion listener could not bind.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
