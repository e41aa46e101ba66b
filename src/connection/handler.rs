//! Listener interface, frame decoding and connection event types

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

// ─────────────────────────────────────────────────────────────────
// Connection Status
// ─────────────────────────────────────────────────────────────────

/// Status of the streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// No connection has been attempted
    Idle,
    /// Handshake in progress
    Connecting,
    /// Connected and receiving frames
    Open,
    /// Closed, either awaiting a reconnect timer or for good
    Closed,
    /// Transport reported an error; a `Closed` transition always follows
    Error,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::Idle
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Open => "open",
            ConnectionStatus::Closed => "closed",
            ConnectionStatus::Error => "error",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────

/// Error event retained by the manager and passed to `on_error`
#[derive(Debug, Clone)]
pub struct ConnectionError {
    /// Endpoint the error occurred on
    pub url: String,
    /// Transport error description
    pub message: String,
    /// When the error was observed
    pub at: DateTime<Utc>,
}

impl ConnectionError {
    pub(crate) fn new(url: &str, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.url, self.message)
    }
}

/// Close code used when the connection drops without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Close event passed to `on_close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code sent by the peer, or 1006 for an abnormal closure
    pub code: u16,
    /// Close reason sent by the peer
    pub reason: String,
    /// Whether the peer completed the closing handshake
    pub was_clean: bool,
}

impl CloseEvent {
    pub(crate) fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: CLOSE_ABNORMAL,
            reason: reason.into(),
            was_clean: false,
        }
    }

    pub(crate) fn from_frame(frame: Option<CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) => Self {
                code: frame.code.into(),
                reason: frame.reason.into_owned(),
                was_clean: true,
            },
            // A close frame without a body means "no status code present"
            None => Self {
                code: 1005,
                reason: String::new(),
                was_clean: true,
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Listener
// ─────────────────────────────────────────────────────────────────

/// Observation hooks for a [`super::ConnectionManager`]
///
/// All methods default to no-ops. Hooks run without any manager lock held,
/// so they may call back into the manager. A panicking hook is caught and
/// logged; it cannot corrupt manager state.
pub trait ConnectionHandler<T>: Send + Sync {
    /// Status transition
    fn on_status(&self, _status: ConnectionStatus) {}

    /// Connection opened
    fn on_open(&self) {}

    /// Decoded inbound frame, with the raw frame it came from
    fn on_message(&self, _message: &T, _frame: &Message) {}

    /// Transport error
    fn on_error(&self, _error: &ConnectionError) {}

    /// Connection closed
    fn on_close(&self, _event: &CloseEvent) {}
}

// ─────────────────────────────────────────────────────────────────
// Decoder
// ─────────────────────────────────────────────────────────────────

/// Turns a raw text or binary frame into the payload type `T`
///
/// Decoders must be total. A panicking decoder is not caught and takes the
/// socket task down with it.
pub struct Decoder<T>(Arc<dyn Fn(&Message) -> T + Send + Sync>);

impl<T> Decoder<T> {
    /// Wrap a decode function
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&Message) -> T + Send + Sync + 'static,
    {
        Self(Arc::new(decode))
    }

    /// Decode one frame
    pub fn decode(&self, frame: &Message) -> T {
        (self.0)(frame)
    }
}

impl Decoder<Message> {
    /// Pass frames through unchanged
    pub fn raw() -> Self {
        Self::new(|frame| frame.clone())
    }
}

impl Decoder<serde_json::Value> {
    /// Parse frames as JSON; frames that are not JSON become a string value
    pub fn json() -> Self {
        Self::new(|frame| match frame {
            Message::Text(text) => serde_json::from_str(text)
                .unwrap_or_else(|_| serde_json::Value::String(text.clone())),
            Message::Binary(bytes) => serde_json::from_slice(bytes).unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(bytes).into_owned())
            }),
            _ => serde_json::Value::Null,
        })
    }
}

impl<T> Clone for Decoder<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Decoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Decoder(..)")
    }
}
