//! Detection event ingestion.
//!
//! Two adapters feed one bus: an HTTP endpoint that intercepts POSTs to the
//! detection path, and a websocket client. The bus normalizes payloads,
//! orders them by receipt and broadcasts them to subscribers such as the
//! event log.

mod bus;
mod connection;
mod error;
mod intercept;
mod log;
mod normalize;
mod server;
mod socket;

pub use bus::{EventBus, SubscriptionId};
pub use connection::{ConnectionEvent, ConnectionState};
pub use error::IngestError;
pub use intercept::{
    InterceptAdapter, InterceptOutcome, OutboundRequest, SyntheticResponse,
    DEFAULT_INTERCEPT_PATH,
};
pub use log::{format_entry, EventLog};
pub use normalize::{normalize, RawPayload, RAW_MESSAGE_EVENT, TIMESTAMP_FORMAT};
pub use server::{IngestServer, DEFAULT_LISTEN_ADDR};
pub use socket::{SocketAdapter, DEFAULT_SOCKET_ENDPOINT};

/// Result type for ingest operations.
pub type IngestResult<T> = Result<T, IngestError>;
