//! Local HTTP listener in front of the intercept adapter.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument};

use crate::error::IngestError;
use crate::intercept::{InterceptAdapter, InterceptOutcome, OutboundRequest};
use crate::IngestResult;

/// Default listen address for the ingestion endpoint.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:5173";

/// HTTP endpoint that feeds every request through an [`InterceptAdapter`].
pub struct IngestServer {
    runtime: Option<Runtime>,
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl IngestServer {
    /// Bind `addr` and start serving on a private runtime.
    #[instrument(name = "ingest_server_start", skip(adapter))]
    pub fn start(addr: &str, adapter: Arc<InterceptAdapter>) -> IngestResult<Self> {
        let runtime = Runtime::new()?;

        let listener = runtime
            .block_on(tokio::net::TcpListener::bind(addr))
            .map_err(|source| IngestError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(adapter);

        runtime.spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Ingest server error: {}", e);
            }
        });

        info!(%local_addr, "Ingest server listening");
        Ok(Self {
            runtime: Some(runtime),
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Address actually bound, useful when started on port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and shut the runtime down.
    #[instrument(name = "ingest_server_stop", skip(self))]
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(5));
            info!(local_addr = %self.local_addr, "Ingest server stopped");
        }
    }
}

impl Drop for IngestServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn router(adapter: Arc<InterceptAdapter>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .fallback(intercept)
        .with_state(adapter)
}

async fn intercept(
    State(adapter): State<Arc<InterceptAdapter>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = OutboundRequest {
        method: method.to_string(),
        target: uri.to_string(),
        body,
    };

    match adapter.handle(request) {
        InterceptOutcome::Intercepted(response) => {
            let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
            (status, Json(response.body)).into_response()
        }
        InterceptOutcome::PassThrough(request) => pass_through(request),
    }
}

/// Nothing sits behind the local listener, so unmatched requests end here.
fn pass_through(request: OutboundRequest) -> Response {
    debug!(method = %request.method, target = %request.target, "No route");
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "message": "No route"})),
    )
        .into_response()
}
