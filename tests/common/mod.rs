//! Common test utilities and fixtures
//!
//! Provides a scriptable mock WebSocket endpoint and an event recorder for
//! connection listeners.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashsync::{CloseEvent, ConnectionError, ConnectionHandler, ConnectionStatus};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};

// ─────────────────────────────────────────────────────────────────
// Mock Stream Endpoint
// ─────────────────────────────────────────────────────────────────

/// What the mock endpoint does with each accepted connection
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Text frames sent right after each handshake
    pub frames: Vec<String>,

    /// The first N connections are closed by the server after the frames
    pub close_first: usize,

    /// Stop listening (refuse further connections) after this many accepts
    pub max_accepts: Option<usize>,
}

/// Mock push endpoint
pub struct MockStream {
    addr: SocketAddr,
    shutdown_tx: Option<mpsc::Sender<()>>,
    accepted: Arc<AtomicUsize>,
    received: Arc<RwLock<Vec<String>>>,
}

impl MockStream {
    /// Start a mock endpoint on an ephemeral port
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(RwLock::new(Vec::new()));

        let accepted_clone = Arc::clone(&accepted);
        let received_clone = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        let Ok((stream, _)) = accept_result else { continue };
                        let index = accepted_clone.fetch_add(1, Ordering::SeqCst);
                        let last = script.max_accepts.is_some_and(|max| index + 1 >= max);
                        let conn_script = script.clone();
                        let received = Arc::clone(&received_clone);
                        tokio::spawn(async move {
                            if let Ok(ws_stream) = accept_async(stream).await {
                                handle_connection(ws_stream, index, conn_script, received).await;
                            }
                        });
                        if last {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            // Listener dropped here; later connects are refused
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            accepted,
            received,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Text frames received from clients
    pub fn received(&self) -> Vec<String> {
        self.received.read().clone()
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

async fn handle_connection(
    mut ws_stream: WebSocketStream<TcpStream>,
    index: usize,
    script: Script,
    received: Arc<RwLock<Vec<String>>>,
) {
    for frame in &script.frames {
        if ws_stream.send(WsMessage::Text(frame.clone())).await.is_err() {
            return;
        }
    }

    if index < script.close_first {
        let _ = ws_stream.send(WsMessage::Close(None)).await;
    }

    while let Some(Ok(msg)) = ws_stream.next().await {
        if let WsMessage::Text(text) = msg {
            received.write().push(text);
        }
    }
}

/// A ws:// URL nothing is listening on
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

// ─────────────────────────────────────────────────────────────────
// Listener Recorder
// ─────────────────────────────────────────────────────────────────

/// Records every listener callback as a short string
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// Status transitions, without the `error` side branch
    pub fn statuses(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("status:").map(String::from))
            .filter(|s| s != "error")
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl<T> ConnectionHandler<T> for Recorder {
    fn on_status(&self, status: ConnectionStatus) {
        self.push(format!("status:{}", status));
    }

    fn on_open(&self) {
        self.push("open".to_string());
    }

    fn on_message(&self, _message: &T, _frame: &WsMessage) {
        self.push("message".to_string());
    }

    fn on_error(&self, _error: &ConnectionError) {
        self.push("error".to_string());
    }

    fn on_close(&self, event: &CloseEvent) {
        self.push(format!("close:{}", event.code));
    }
}

// ─────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────

/// Poll `condition` every 10ms until it holds or `timeout` elapses
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
