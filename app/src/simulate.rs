//! Detection producers for exercising a running monitor.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use futures_util::{SinkExt, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Labels the simulated detector emits.
pub const EVENT_TYPES: [&str; 5] = [
    "Person detected",
    "Vehicle detected",
    "Motion detected",
    "Animal detected",
    "Unknown object",
];

/// Build a random detection payload for one of `feed_ids`.
pub fn random_detection(rng: &mut impl Rng, feed_ids: &[String]) -> Value {
    let feed_id = feed_ids
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| "1".to_string());
    let event = EVENT_TYPES.choose(rng).copied().unwrap_or(EVENT_TYPES[0]);
    let confidence = (rng.gen_range(0.60..=0.99_f64) * 100.0).round() / 100.0;

    let mut payload = json!({
        "event": event,
        "timestamp": Local::now().format("%H:%M:%S").to_string(),
        "feedId": feed_id,
        "confidence": confidence,
    });

    if rng.gen_bool(0.3) {
        payload["boundingBox"] = json!({
            "x": rng.gen_range(10..=300),
            "y": rng.gen_range(10..=200),
            "width": rng.gen_range(50..=200),
            "height": rng.gen_range(50..=200),
        });
    }
    payload
}

/// POST `count` random detections to `url`, `interval` apart.
///
/// Returns how many were accepted. Stops early on the first failure, as
/// there is no point waiting out the interval against a dead endpoint.
pub fn send_detections(
    url: &str,
    count: usize,
    interval: Duration,
    feed_ids: &[String],
) -> Result<usize> {
    println!("Sending {count} detection events to {url} every {interval:?}");
    let mut rng = rand::thread_rng();
    let mut sent = 0;

    for i in 0..count {
        let payload = random_detection(&mut rng, feed_ids);
        match ureq::post(url).send_json(&payload) {
            Ok(_) => {
                sent += 1;
                println!("sent: {payload}");
            }
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                println!("failed with status {status}: {body}");
                break;
            }
            Err(e) => {
                println!("failed: {e}");
                break;
            }
        }

        if i + 1 < count {
            thread::sleep(interval);
        }
    }

    println!("Sent {sent} of {count} detection events");
    Ok(sent)
}

/// Serve a websocket that greets clients and broadcasts random detections.
pub fn simulate_socket(listen: &str, feed_ids: Vec<String>) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(async move {
        let listener = TcpListener::bind(listen)
            .await
            .with_context(|| format!("Failed to bind {listen}"))?;
        println!("Detection socket running at ws://{}/ws", listener.local_addr()?);
        serve_socket(listener, feed_ids, (2.0, 5.0)).await;
        Ok::<(), anyhow::Error>(())
    })
}

/// Accept clients on `listener` forever. Detections go out every
/// `pause_secs.0..pause_secs.1` seconds while any client is connected.
pub async fn serve_socket(listener: TcpListener, feed_ids: Vec<String>, pause_secs: (f64, f64)) {
    let (tx, _) = broadcast::channel::<String>(64);

    let publisher = tx.clone();
    tokio::spawn(async move {
        loop {
            if publisher.receiver_count() == 0 {
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }

            let (payload, pause) = {
                let mut rng = rand::thread_rng();
                let payload = random_detection(&mut rng, &feed_ids).to_string();
                (payload, rng.gen_range(pause_secs.0..=pause_secs.1))
            };
            match publisher.send(payload.clone()) {
                Ok(clients) => debug!(clients, "Broadcast {}", payload),
                Err(_) => debug!("No clients left"),
            }
            tokio::time::sleep(Duration::from_secs_f64(pause)).await;
        }
    });

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tokio::spawn(handle_client(stream, addr, tx.subscribe()));
            }
            Err(e) => warn!("Accept failed: {}", e),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    addr: SocketAddr,
    mut detections: broadcast::Receiver<String>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, "Handshake failed: {}", e);
            return;
        }
    };
    info!(%addr, "Client connected");
    let (mut write, mut read) = ws.split();

    let welcome = json!({
        "event": "Server connection",
        "message": "Connected to WebSocket server",
        "timestamp": Local::now().format("%H:%M:%S").to_string(),
    });
    if write.send(Message::Text(welcome.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            detection = detections.recv() => match detection {
                Ok(payload) => {
                    if write.send(Message::Text(payload)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(%addr, skipped, "Client lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    info!(%addr, "Client disconnected");
}
