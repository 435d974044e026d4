//! Websocket detection feed.
//!
//! The adapter keeps at most one connection attempt alive. Every attempt
//! gets a generation number; the network task checks its generation under
//! the gate lock before changing state or publishing, so once an attempt is
//! closed, superseded or torn down nothing it does afterwards is observable.

use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::ReentrantMutex;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use feedwatch_ipc::SourceChannel;

use crate::bus::EventBus;
use crate::connection::{ConnectionEvent, ConnectionState};
use crate::error::IngestError;
use crate::normalize::RawPayload;
use crate::IngestResult;

/// Endpoint used when none is configured.
pub const DEFAULT_SOCKET_ENDPOINT: &str = "ws://localhost:8080/ws";

struct SocketInner {
    endpoint: String,
    state: ConnectionState,
    generation: u64,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    status_txs: Vec<Sender<ConnectionEvent>>,
    torn_down: bool,
}

impl SocketInner {
    fn transition_to(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        let previous = std::mem::replace(&mut self.state, next);
        info!(
            endpoint = %self.endpoint,
            from = %previous.message(),
            to = %self.state.message(),
            "Socket state changed"
        );

        let event = ConnectionEvent {
            endpoint: self.endpoint.clone(),
            previous,
            current: self.state.clone(),
        };
        self.status_txs.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Retire the current attempt. Nothing it reports afterwards is applied.
    fn close_attempt(&mut self) {
        self.generation += 1;
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if self.state == ConnectionState::Connecting {
                debug!(endpoint = %self.endpoint, "Aborting connection attempt");
                task.abort();
            }
        }
    }
}

/// State shared between the adapter and its network task.
struct SocketShared {
    gate: ReentrantMutex<RefCell<SocketInner>>,
    bus: EventBus,
}

impl SocketShared {
    fn is_current(inner: &SocketInner, generation: u64) -> bool {
        !inner.torn_down && inner.generation == generation
    }

    fn opened(&self, generation: u64) -> bool {
        let guard = self.gate.lock();
        let mut inner = guard.borrow_mut();
        if !Self::is_current(&inner, generation) {
            trace!(generation, "Open from retired attempt dropped");
            return false;
        }
        inner.transition_to(ConnectionState::Connected);
        true
    }

    fn finished(&self, generation: u64, state: ConnectionState) {
        let guard = self.gate.lock();
        let mut inner = guard.borrow_mut();
        if !Self::is_current(&inner, generation) {
            trace!(generation, "Close from retired attempt dropped");
            return;
        }
        inner.close_tx = None;
        inner.task = None;
        inner.transition_to(state);
    }

    /// Publish a frame if its attempt is still current. The gate stays held
    /// through the publish.
    fn deliver(&self, generation: u64, payload: RawPayload) -> bool {
        let guard = self.gate.lock();
        let current = {
            let inner = guard.borrow();
            Self::is_current(&inner, generation) && inner.state.is_connected()
        };
        if !current {
            trace!(generation, "Frame from retired attempt dropped");
            return false;
        }
        let sequence = self.bus.publish(payload, SourceChannel::Socket);
        trace!(generation, sequence, "Socket frame published");
        true
    }
}

/// Duplex connection to a detection publisher.
pub struct SocketAdapter {
    shared: Arc<SocketShared>,
    runtime: Option<Runtime>,
}

impl SocketAdapter {
    /// Create a disconnected adapter for `endpoint`.
    pub fn new(endpoint: &str, bus: EventBus) -> IngestResult<Self> {
        validate_endpoint(endpoint)?;
        let runtime = Runtime::new()?;

        Ok(Self {
            shared: Arc::new(SocketShared {
                gate: ReentrantMutex::new(RefCell::new(SocketInner {
                    endpoint: endpoint.to_string(),
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    close_tx: None,
                    task: None,
                    status_txs: Vec::new(),
                    torn_down: false,
                })),
                bus,
            }),
            runtime: Some(runtime),
        })
    }

    /// Open a connection to the configured endpoint.
    #[instrument(name = "socket_connect", skip(self))]
    pub fn connect(&self) -> IngestResult<()> {
        let guard = self.shared.gate.lock();
        let mut inner = guard.borrow_mut();
        if inner.torn_down {
            return Err(IngestError::TornDown);
        }
        if inner.state.is_active() {
            return Err(IngestError::AlreadyConnected);
        }
        self.start_attempt(&mut inner)
    }

    fn start_attempt(&self, inner: &mut SocketInner) -> IngestResult<()> {
        let runtime = self.runtime.as_ref().ok_or(IngestError::TornDown)?;

        inner.generation += 1;
        let generation = inner.generation;
        inner.transition_to(ConnectionState::Connecting);

        let (close_tx, close_rx) = oneshot::channel();
        let shared = Arc::clone(&self.shared);
        let endpoint = inner.endpoint.clone();
        inner.close_tx = Some(close_tx);
        inner.task = Some(runtime.spawn(run_socket(shared, generation, endpoint, close_rx)));
        Ok(())
    }

    /// Close the connection or abort the attempt in progress.
    #[instrument(name = "socket_disconnect", skip(self))]
    pub fn disconnect(&self) {
        let guard = self.shared.gate.lock();
        let mut inner = guard.borrow_mut();
        inner.close_attempt();
        inner.transition_to(ConnectionState::Disconnected);
    }

    /// Operator reconnect: close when active, connect otherwise.
    pub fn toggle(&self) -> IngestResult<ConnectionState> {
        let guard = self.shared.gate.lock();
        if guard.borrow().state.is_active() {
            self.disconnect();
        } else {
            self.connect()?;
        }
        let state = guard.borrow().state.clone();
        Ok(state)
    }

    /// Point the adapter at a new endpoint and connect to it.
    #[instrument(name = "socket_set_endpoint", skip(self))]
    pub fn set_endpoint(&self, endpoint: &str) -> IngestResult<()> {
        validate_endpoint(endpoint)?;

        let guard = self.shared.gate.lock();
        let mut inner = guard.borrow_mut();
        if inner.torn_down {
            return Err(IngestError::TornDown);
        }
        inner.close_attempt();
        inner.transition_to(ConnectionState::Disconnected);
        inner.endpoint = endpoint.to_string();
        self.start_attempt(&mut inner)
    }

    /// Close the connection and stop the network runtime. Nothing is
    /// published after this returns.
    #[instrument(name = "socket_teardown", skip(self))]
    pub fn teardown(&mut self) {
        {
            let guard = self.shared.gate.lock();
            let mut inner = guard.borrow_mut();
            if inner.torn_down {
                return;
            }
            inner.close_attempt();
            inner.transition_to(ConnectionState::Disconnected);
            inner.torn_down = true;
            inner.status_txs.clear();
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(2));
        }
        info!("Socket adapter torn down");
    }

    /// Receive a [`ConnectionEvent`] for every state change from now on.
    pub fn subscribe_status(&self) -> Receiver<ConnectionEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let guard = self.shared.gate.lock();
        guard.borrow_mut().status_txs.push(tx);
        rx
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.gate.lock().borrow().state.clone()
    }

    pub fn endpoint(&self) -> String {
        self.shared.gate.lock().borrow().endpoint.clone()
    }
}

impl Drop for SocketAdapter {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn validate_endpoint(endpoint: &str) -> IngestResult<()> {
    let url = Url::parse(endpoint)
        .map_err(|e| IngestError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(IngestError::InvalidEndpoint(
            "Endpoint must start with ws:// or wss://".to_string(),
        ));
    }
    if url.host_str().is_none() {
        return Err(IngestError::InvalidEndpoint(format!("{endpoint}: missing host")));
    }
    Ok(())
}

async fn run_socket(
    shared: Arc<SocketShared>,
    generation: u64,
    endpoint: String,
    mut close_rx: oneshot::Receiver<()>,
) {
    debug!(%endpoint, generation, "Connecting to socket");

    let stream = tokio::select! {
        _ = &mut close_rx => return,
        result = connect_async(endpoint.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(%endpoint, "Socket connection failed: {}", e);
                shared.finished(generation, ConnectionState::Errored { reason: e.to_string() });
                return;
            }
        },
    };

    if !shared.opened(generation) {
        return;
    }

    let (mut write, mut read) = stream.split();
    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = write.send(Message::Close(None)).await;
                return;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !shared.deliver(generation, RawPayload::parse(&text)) {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data);
                    if !shared.deliver(generation, RawPayload::parse(&text)) {
                        return;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(%endpoint, ?frame, "Socket closed by peer");
                    shared.finished(generation, ConnectionState::Disconnected);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(%endpoint, "Socket error: {}", e);
                    shared.finished(generation, ConnectionState::Errored { reason: e.to_string() });
                    return;
                }
                None => {
                    shared.finished(generation, ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }
}
