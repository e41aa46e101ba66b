//! Integration tests for the connection manager
//!
//! Runs the manager against a local mock endpoint: open, close, capped
//! reconnects, manual reconnect and listener isolation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use dashsync::{ConnectionConfig, ConnectionHandler, ConnectionManager, ConnectionStatus, Decoder};
use tokio_tungstenite::tungstenite::Message;

use common::{refused_url, wait_until, MockStream, Recorder, Script};

const WAIT: Duration = Duration::from_secs(5);

fn config(max_attempts: u32, delay_ms: u64) -> ConnectionConfig {
    ConnectionConfig {
        auto_reconnect: true,
        reconnect_interval: Duration::from_millis(delay_ms),
        max_reconnect_attempts: max_attempts,
        protocols: vec![],
    }
}

// ─────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_open_receives_frames() {
    let server = MockStream::start(Script {
        frames: vec!["hello".to_string()],
        ..Default::default()
    })
    .await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(3, 100));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.last_message().is_some()).await);

    assert_eq!(manager.status(), ConnectionStatus::Open);
    assert!(manager.is_connected());
    assert_eq!(manager.last_message(), Some(Message::Text("hello".to_string())));
    assert_eq!(recorder.statuses(), vec!["connecting", "open"]);
    assert_eq!(recorder.count("open"), 1);
    assert_eq!(recorder.count("message"), 1);

    manager.disconnect();
}

#[tokio::test]
async fn test_send_reaches_endpoint() {
    let server = MockStream::start(Script::default()).await;
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(3, 100));

    manager.connect();
    assert!(wait_until(WAIT, || manager.is_connected()).await);

    manager.send(Message::Text("subscribe:visits".to_string()));
    assert!(wait_until(WAIT, || server.received() == vec!["subscribe:visits"]).await);

    manager.disconnect();
}

#[tokio::test]
async fn test_reconnect_after_unexpected_close() {
    let server = MockStream::start(Script {
        close_first: 1,
        ..Default::default()
    })
    .await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(3, 100));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || server.accepted() == 2 && manager.is_connected()).await);

    assert_eq!(
        recorder.statuses(),
        vec!["connecting", "open", "closed", "connecting", "open"]
    );
    assert_eq!(recorder.count("close:1005"), 1);
    // A successful open resets the counter
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.disconnect();
}

#[tokio::test]
async fn test_reconnect_exhausts_after_max_attempts() {
    let server = MockStream::start(Script {
        close_first: 1,
        max_accepts: Some(1),
        ..Default::default()
    })
    .await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(3, 100));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.is_exhausted()).await);

    assert_eq!(
        recorder.statuses(),
        vec![
            "connecting", "open", "closed",
            "connecting", "closed",
            "connecting", "closed",
            "connecting", "closed",
        ]
    );
    assert_eq!(manager.reconnect_attempts(), 3);
    assert_eq!(manager.status(), ConnectionStatus::Closed);
    assert!(!manager.reconnect_pending());
    assert!(manager.last_error().is_some());

    // Exhaustion is terminal until a manual reconnect
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(recorder.statuses().len(), 9);
}

#[tokio::test]
async fn test_manual_reconnect_resets_exhaustion() {
    let url = refused_url().await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(url), config(2, 50));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.is_exhausted()).await);
    assert_eq!(recorder.count("status:connecting"), 3);
    assert_eq!(manager.reconnect_attempts(), 2);

    manager.reconnect();
    assert!(!manager.is_exhausted());
    assert_eq!(manager.status(), ConnectionStatus::Connecting);

    assert!(wait_until(WAIT, || manager.is_exhausted()).await);
    assert_eq!(recorder.count("status:connecting"), 6);
}

#[tokio::test]
async fn test_refused_connection_reports_error_then_closed() {
    let url = refused_url().await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(
        Some(url),
        ConnectionConfig {
            auto_reconnect: false,
            ..Default::default()
        },
    );
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.status() == ConnectionStatus::Closed).await);

    let events = recorder.events();
    let error_at = events.iter().position(|e| e == "status:error").unwrap();
    let closed_at = events.iter().position(|e| e == "status:closed").unwrap();
    assert!(error_at < closed_at);
    assert_eq!(recorder.count("close:1006"), 1);
    assert!(!manager.reconnect_pending());
    // Never attempted, so never exhausted
    assert!(!manager.is_exhausted());
}

#[tokio::test]
async fn test_manual_disconnect_never_reconnects() {
    let server = MockStream::start(Script::default()).await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(5, 50));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.is_connected()).await);

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Closed);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(recorder.statuses(), vec!["connecting", "open", "closed"]);
    assert!(!manager.reconnect_pending());
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_connect_replaces_open_connection() {
    let server = MockStream::start(Script::default()).await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::raw(Some(server.ws_url()), config(5, 50));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.is_connected()).await);
    manager.connect();
    assert!(wait_until(WAIT, || server.accepted() == 2 && manager.is_connected()).await);

    // The replaced socket's close is not an unexpected close
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(recorder.statuses(), vec!["connecting", "open", "connecting", "open"]);
    assert_eq!(server.accepted(), 2);
    assert_eq!(manager.reconnect_attempts(), 0);

    manager.disconnect();
}

// ─────────────────────────────────────────────────────────────────
// Listeners
// ─────────────────────────────────────────────────────────────────

struct PanickingListener;

impl<T> ConnectionHandler<T> for PanickingListener {
    fn on_open(&self) {
        panic!("listener failure on open");
    }

    fn on_message(&self, _message: &T, _frame: &Message) {
        panic!("listener failure on message");
    }
}

#[tokio::test]
async fn test_panicking_listener_does_not_corrupt_state() {
    let server = MockStream::start(Script {
        frames: vec!["1".to_string(), "2".to_string()],
        ..Default::default()
    })
    .await;
    let recorder = Recorder::new();
    let manager = ConnectionManager::new(
        Some(server.ws_url()),
        config(3, 100),
        Decoder::new(|frame: &Message| match frame {
            Message::Text(text) => text.parse::<u32>().unwrap_or_default(),
            _ => 0,
        }),
    );
    manager.add_listener(Arc::new(PanickingListener));
    manager.add_listener(recorder.clone());

    manager.connect();
    assert!(wait_until(WAIT, || manager.last_message() == Some(2)).await);

    assert_eq!(manager.status(), ConnectionStatus::Open);
    assert_eq!(recorder.count("message"), 2);

    manager.disconnect();
}
