//! WebSocket connection manager
//!
//! One manager owns at most one live socket. Each `connect()` starts a new
//! socket generation; frames and lifecycle events from older generations
//! are discarded, so replacing or closing a socket never feeds stale events
//! into the reconnect logic.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use super::handler::{CloseEvent, ConnectionError, ConnectionHandler, ConnectionStatus, Decoder};
use crate::error::{Error, Result};

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for a connection manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Reconnect automatically after an unexpected close
    pub auto_reconnect: bool,

    /// Fixed delay before each reconnect attempt
    pub reconnect_interval: Duration,

    /// Reconnect attempts allowed before giving up
    pub max_reconnect_attempts: u32,

    /// Sub-protocols offered in the handshake
    pub protocols: Vec<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            reconnect_interval: Duration::from_millis(5000),
            max_reconnect_attempts: 10,
            protocols: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Manager State
// ─────────────────────────────────────────────────────────────────

struct ManagerState<T> {
    status: ConnectionStatus,
    last_message: Option<T>,
    last_error: Option<ConnectionError>,
    reconnect_attempts: u32,
    /// Closed with every automatic attempt used up
    exhausted: bool,
}

impl<T> Default for ManagerState<T> {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Idle,
            last_message: None,
            last_error: None,
            reconnect_attempts: 0,
            exhausted: false,
        }
    }
}

/// Outbound half of the live socket
struct ActiveSocket {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
}

/// The single pending reconnect timer
struct ReconnectTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct Inner<T> {
    url: Option<String>,
    config: ConnectionConfig,
    decoder: Decoder<T>,
    listeners: RwLock<Vec<Arc<dyn ConnectionHandler<T>>>>,
    state: RwLock<ManagerState<T>>,
    socket: Mutex<Option<ActiveSocket>>,
    reconnect_timer: Mutex<Option<ReconnectTimer>>,
    generation: AtomicU64,
    timer_seq: AtomicU64,
    alive: AtomicBool,
}

// ─────────────────────────────────────────────────────────────────
// Connection Manager
// ─────────────────────────────────────────────────────────────────

/// Manages one streaming connection with capped, fixed-delay reconnects
///
/// Cloning yields another handle to the same connection. All operations
/// must be called from within a tokio runtime.
pub struct ConnectionManager<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConnectionManager<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ConnectionManager<Message> {
    /// Create a manager that publishes raw frames
    pub fn raw(url: Option<String>, config: ConnectionConfig) -> Self {
        Self::new(url, config, Decoder::raw())
    }
}

impl<T> ConnectionManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a manager for `url`; `None` disables the connection entirely
    pub fn new(url: Option<String>, config: ConnectionConfig, decoder: Decoder<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                url,
                config,
                decoder,
                listeners: RwLock::new(Vec::new()),
                state: RwLock::new(ManagerState::default()),
                socket: Mutex::new(None),
                reconnect_timer: Mutex::new(None),
                generation: AtomicU64::new(0),
                timer_seq: AtomicU64::new(0),
                alive: AtomicBool::new(true),
            }),
        }
    }

    /// Register a listener for lifecycle and message events
    pub fn add_listener(&self, listener: Arc<dyn ConnectionHandler<T>>) {
        self.inner.listeners.write().push(listener);
    }

    /// Open a connection, replacing any existing one
    pub fn connect(&self) {
        self.inner.connect();
    }

    /// Cancel any pending reconnect and close the connection
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Reset the attempt counter and connect immediately
    ///
    /// This is the only way out of the exhausted state.
    pub fn reconnect(&self) {
        self.inner.reconnect();
    }

    /// Send a frame; dropped silently unless the connection is open
    pub fn send(&self, frame: Message) {
        self.inner.send(frame);
    }

    /// Tear down for good: cancel the timer, close the socket and ignore
    /// every later operation
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }

    /// Configured endpoint
    pub fn url(&self) -> Option<&str> {
        self.inner.url.as_deref()
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        self.inner.state.read().status
    }

    /// Whether the connection is open
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Most recent decoded message
    pub fn last_message(&self) -> Option<T> {
        self.inner.state.read().last_message.clone()
    }

    /// Most recent transport error
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.inner.state.read().last_error.clone()
    }

    /// Automatic reconnect attempts since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.state.read().reconnect_attempts
    }

    /// Closed with all automatic reconnect attempts used up
    pub fn is_exhausted(&self) -> bool {
        self.inner.state.read().exhausted
    }

    /// Whether a reconnect timer is pending
    pub fn reconnect_pending(&self) -> bool {
        self.inner.reconnect_timer.lock().is_some()
    }
}

impl<T> Inner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_current(&self, generation: u64) -> bool {
        self.alive.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn connect(self: &Arc<Self>) {
        if !self.alive.load(Ordering::SeqCst) {
            debug!("Ignoring connect on a shut down connection manager");
            return;
        }
        let Some(url) = self.url.clone() else {
            return;
        };

        self.cancel_reconnect_timer();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.socket.lock().take();

        self.set_status(ConnectionStatus::Connecting);

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.socket.lock() = Some(ActiveSocket {
            generation,
            outbound: outbound_tx,
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.run_socket(url, generation, outbound_rx).await;
        });
    }

    fn disconnect(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel_reconnect_timer();
        // Dropping the sender makes the socket task send a close frame and exit
        self.socket.lock().take();
        self.set_status(ConnectionStatus::Closed);
    }

    fn reconnect(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            state.reconnect_attempts = 0;
            state.exhausted = false;
        }
        self.cancel_reconnect_timer();
        self.connect();
    }

    fn send(&self, frame: Message) {
        if self.state.read().status != ConnectionStatus::Open {
            debug!("Dropping outbound frame, connection is not open");
            return;
        }
        if let Some(socket) = self.socket.lock().as_ref() {
            let _ = socket.outbound.send(frame);
        }
    }

    fn shutdown(&self) {
        self.cancel_reconnect_timer();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.socket.lock().take();
        self.alive.store(false, Ordering::SeqCst);
        debug!(url = ?self.url, "Connection manager shut down");
    }

    // ─────────────────────────────────────────────────────────────
    // Socket Task
    // ─────────────────────────────────────────────────────────────

    async fn run_socket(
        self: Arc<Self>,
        url: String,
        generation: u64,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) {
        let request = match build_request(&url, &self.config.protocols) {
            Ok(request) => request,
            Err(e) => {
                error!(url = %url, error = %e, "Invalid stream endpoint");
                self.handle_error(generation, &url, e.to_string());
                self.handle_close(generation, CloseEvent::abnormal(e.to_string()));
                return;
            }
        };

        info!(url = %url, generation, "Connecting to stream endpoint");

        let handshake = connect_async(request);
        tokio::pin!(handshake);

        let result = loop {
            tokio::select! {
                result = &mut handshake => break result,
                frame = outbound.recv() => {
                    if frame.is_none() {
                        debug!(url = %url, generation, "Connection abandoned during handshake");
                        return;
                    }
                }
            }
        };

        let ws_stream = match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to connect to stream endpoint");
                self.handle_error(generation, &url, e.to_string());
                self.handle_close(generation, CloseEvent::abnormal(e.to_string()));
                return;
            }
        };

        if !self.is_current(generation) {
            debug!(url = %url, generation, "Discarding superseded connection");
            let (mut write, _read) = ws_stream.split();
            let _ = write.send(Message::Close(None)).await;
            return;
        }

        self.handle_open(generation, &url);

        let (mut write, mut read) = ws_stream.split();

        let close_event = loop {
            tokio::select! {
                frame = read.next() => {
                    match frame {
                        Some(Ok(frame @ (Message::Text(_) | Message::Binary(_)))) => {
                            self.handle_message(generation, &frame);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                self.handle_error(generation, &url, e.to_string());
                                break CloseEvent::abnormal(e.to_string());
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(url = %url, frame = ?frame, "Received close frame");
                            break CloseEvent::from_frame(frame);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(url = %url, error = %e, "WebSocket error");
                            self.handle_error(generation, &url, e.to_string());
                            break CloseEvent::abnormal(e.to_string());
                        }
                        None => {
                            info!(url = %url, "WebSocket stream ended");
                            break CloseEvent::abnormal("stream ended");
                        }
                    }
                }

                frame = outbound.recv() => {
                    match frame {
                        Some(frame) => {
                            if let Err(e) = write.send(frame).await {
                                warn!(url = %url, error = %e, "Failed to send frame");
                                self.handle_error(generation, &url, e.to_string());
                                break CloseEvent::abnormal(e.to_string());
                            }
                        }
                        None => {
                            // Closed locally; the owner has already moved on
                            let _ = write.send(Message::Close(None)).await;
                            debug!(url = %url, generation, "Connection closed locally");
                            return;
                        }
                    }
                }
            }
        };

        self.handle_close(generation, close_event);
    }

    // ─────────────────────────────────────────────────────────────
    // Event Handling
    // ─────────────────────────────────────────────────────────────

    fn handle_open(&self, generation: u64, url: &str) {
        if !self.is_current(generation) {
            return;
        }
        {
            let mut state = self.state.write();
            state.reconnect_attempts = 0;
            state.exhausted = false;
        }
        info!(url = %url, "Stream connection established");
        self.set_status(ConnectionStatus::Open);
        self.notify(|listener| listener.on_open());
    }

    fn handle_message(&self, generation: u64, frame: &Message) {
        if !self.is_current(generation) {
            return;
        }
        let message = self.decoder.decode(frame);
        self.state.write().last_message = Some(message.clone());
        self.notify(|listener| listener.on_message(&message, frame));
    }

    fn handle_error(&self, generation: u64, url: &str, message: String) {
        if !self.is_current(generation) {
            return;
        }
        let event = ConnectionError::new(url, message);
        self.state.write().last_error = Some(event.clone());
        self.set_status(ConnectionStatus::Error);
        self.notify(|listener| listener.on_error(&event));
    }

    fn handle_close(self: &Arc<Self>, generation: u64, event: CloseEvent) {
        if !self.is_current(generation) {
            return;
        }
        {
            let mut socket = self.socket.lock();
            if socket.as_ref().map(|s| s.generation) == Some(generation) {
                *socket = None;
            }
        }

        self.set_status(ConnectionStatus::Closed);
        self.notify(|listener| listener.on_close(&event));

        if !self.config.auto_reconnect {
            return;
        }

        let attempt = {
            let mut state = self.state.write();
            if state.reconnect_attempts < self.config.max_reconnect_attempts {
                state.reconnect_attempts += 1;
                Some(state.reconnect_attempts)
            } else {
                state.exhausted = true;
                None
            }
        };

        match attempt {
            Some(attempt) => {
                info!(
                    url = ?self.url,
                    attempt,
                    max = self.config.max_reconnect_attempts,
                    delay_ms = self.config.reconnect_interval.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.schedule_reconnect(generation);
            }
            None => {
                warn!(
                    url = ?self.url,
                    max = self.config.max_reconnect_attempts,
                    "Max reconnect attempts reached, staying closed"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Reconnect Timer
    // ─────────────────────────────────────────────────────────────

    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let mut timer = self.reconnect_timer.lock();
        // Checked under the timer lock so a concurrent disconnect either
        // sees this timer and cancels it, or this call sees the disconnect
        if !self.is_current(generation) {
            return;
        }
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }

        let id = self.timer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.config.reconnect_interval;
        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire_reconnect_timer(id);
        });
        *timer = Some(ReconnectTimer { id, handle });
    }

    fn fire_reconnect_timer(self: &Arc<Self>, id: u64) {
        {
            let mut timer = self.reconnect_timer.lock();
            match timer.as_ref() {
                Some(pending) if pending.id == id => {
                    timer.take();
                }
                _ => return,
            }
        }
        debug!(url = ?self.url, "Reconnect timer fired");
        self.connect();
    }

    fn cancel_reconnect_timer(&self) {
        if let Some(timer) = self.reconnect_timer.lock().take() {
            timer.handle.abort();
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Listener Dispatch
    // ─────────────────────────────────────────────────────────────

    fn set_status(&self, status: ConnectionStatus) {
        self.state.write().status = status;
        debug!(url = ?self.url, status = %status, "Connection status changed");
        self.notify(|listener| listener.on_status(status));
    }

    fn notify<F>(&self, f: F)
    where
        F: Fn(&dyn ConnectionHandler<T>),
    {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| f(listener.as_ref()))).is_err() {
                error!(url = ?self.url, "Connection listener panicked, ignoring");
            }
        }
    }
}

/// Build the handshake request, offering sub-protocols when configured
fn build_request(url: &str, protocols: &[String]) -> Result<Request> {
    let parsed = Url::parse(url).map_err(|e| Error::invalid_endpoint(url, e.to_string()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(Error::invalid_endpoint(url, "scheme must be ws or wss"));
    }

    let mut request = url.into_client_request()?;
    if !protocols.is_empty() {
        let value = HeaderValue::from_str(&protocols.join(", "))
            .map_err(|e| Error::invalid_endpoint(url, format!("invalid sub-protocol: {}", e)))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(request)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ConnectionConfig::default();
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5000));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert!(config.protocols.is_empty());
    }

    #[test]
    fn test_build_request_rejects_http() {
        let err = build_request("http://example.com/feed", &[]).unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_build_request_sets_protocols() {
        let protocols = vec!["metrics.v1".to_string(), "metrics.v2".to_string()];
        let request = build_request("ws://localhost:9000/feed", &protocols).unwrap();
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "metrics.v1, metrics.v2"
        );

        let request = build_request("wss://localhost/feed", &[]).unwrap();
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[tokio::test]
    async fn test_connect_without_url_is_noop() {
        let manager = ConnectionManager::raw(None, ConnectionConfig::default());
        manager.connect();
        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(!manager.is_connected());
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = ConnectionManager::raw(None, ConnectionConfig::default());
        manager.disconnect();
        manager.disconnect();
        assert_eq!(manager.status(), ConnectionStatus::Closed);
        assert!(!manager.reconnect_pending());
    }

    #[tokio::test]
    async fn test_send_when_not_open_is_dropped() {
        let manager = ConnectionManager::raw(None, ConnectionConfig::default());
        manager.send(Message::Text("ignored".to_string()));
        assert_eq!(manager.status(), ConnectionStatus::Idle);
    }

    #[tokio::test]
    async fn test_invalid_endpoint_reports_error_then_closed() {
        let config = ConnectionConfig {
            auto_reconnect: false,
            ..Default::default()
        };
        let manager = ConnectionManager::raw(Some("http://not-a-socket".to_string()), config);
        manager.connect();

        for _ in 0..100 {
            if manager.status() == ConnectionStatus::Closed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(manager.status(), ConnectionStatus::Closed);
        assert!(manager.last_error().unwrap().message.contains("scheme"));
        assert!(!manager.reconnect_pending());
        assert!(!manager.is_exhausted());
    }

    #[tokio::test]
    async fn test_shutdown_ignores_later_connects() {
        let manager = ConnectionManager::raw(
            Some("ws://127.0.0.1:9".to_string()),
            ConnectionConfig::default(),
        );
        manager.shutdown();
        manager.connect();
        assert_eq!(manager.status(), ConnectionStatus::Idle);
        assert!(!manager.reconnect_pending());
    }
}
