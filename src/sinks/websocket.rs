//! WebSocket fan-out.
//!
//! By default the bridge runs a server and broadcasts to every connected
//! client; configuring a remote server flips the role to a reconnecting
//! client of that address. Text received from peers is fed back into the
//! engine as if it had arrived on the serial line.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::config::WebSocketConfig;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Running WebSocket endpoint. Dropping the handle aborts the task and
/// closes every peer.
pub struct WsHandle {
    outgoing: broadcast::Sender<String>,
    clients: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl WsHandle {
    /// Queue a message for every connected peer. No peers is not an error.
    pub fn broadcast(&self, message: String) {
        let _ = self.outgoing.send(message);
    }

    /// A clonable sender for the dispatcher.
    pub fn sender(&self) -> broadcast::Sender<String> {
        self.outgoing.clone()
    }

    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }
}

impl Drop for WsHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start the endpoint in the role the configuration asks for. Messages
/// received from peers land in `incoming`.
pub async fn start(config: &WebSocketConfig, incoming: mpsc::Sender<String>) -> Result<WsHandle> {
    let (outgoing, _) = broadcast::channel(64);
    let clients = Arc::new(AtomicUsize::new(0));

    let task = if config.remote_server.is_empty() {
        let addr = format!("0.0.0.0:{}", config.listen_port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind WebSocket listener on {addr}"))?;
        info!("WebSocket server listening on {addr}");
        tokio::spawn(accept_loop(
            listener,
            outgoing.clone(),
            clients.clone(),
            incoming,
        ))
    } else {
        let url = normalize_url(&config.remote_server);
        tokio::spawn(client_loop(
            url,
            outgoing.clone(),
            clients.clone(),
            incoming,
        ))
    };

    Ok(WsHandle {
        outgoing,
        clients,
        task,
    })
}

fn normalize_url(remote: &str) -> String {
    if remote.contains("://") {
        remote.to_string()
    } else {
        format!("ws://{remote}")
    }
}

async fn accept_loop(
    listener: TcpListener,
    outgoing: broadcast::Sender<String>,
    clients: Arc<AtomicUsize>,
    incoming: mpsc::Sender<String>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("WebSocket accept failed: {e}");
                continue;
            }
        };
        let rx = outgoing.subscribe();
        let clients = clients.clone();
        let incoming = incoming.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    clients.fetch_add(1, Ordering::Relaxed);
                    info!("WebSocket client connected: {peer}");
                    serve(ws, rx, incoming).await;
                    clients.fetch_sub(1, Ordering::Relaxed);
                    info!("WebSocket client disconnected: {peer}");
                }
                Err(e) => warn!("WebSocket handshake with {peer} failed: {e}"),
            }
        });
    }
}

async fn client_loop(
    url: String,
    outgoing: broadcast::Sender<String>,
    clients: Arc<AtomicUsize>,
    incoming: mpsc::Sender<String>,
) {
    loop {
        match tokio_tungstenite::connect_async(&url).await {
            Ok((ws, _)) => {
                clients.fetch_add(1, Ordering::Relaxed);
                info!("Connected to WebSocket server {url}");
                serve(ws, outgoing.subscribe(), incoming.clone()).await;
                clients.fetch_sub(1, Ordering::Relaxed);
                warn!(
                    "WebSocket server connection lost, retrying in {}s",
                    RECONNECT_DELAY.as_secs()
                );
            }
            Err(e) => warn!(
                "WebSocket connect to {url} failed: {e}, retrying in {}s",
                RECONNECT_DELAY.as_secs()
            ),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Pump one peer: forward broadcasts out, feed incoming text back.
async fn serve<S>(
    ws: WebSocketStream<S>,
    mut rx: broadcast::Receiver<String>,
    incoming: mpsc::Sender<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("WebSocket peer lagged, {skipped} messages dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if incoming.send(text).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket read error: {e}");
                    break;
                }
            },
        }
    }
}
