//! Error types for dashsync
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Connection lifecycle faults never surface through this type to callers of
//! the sync layer; they are absorbed into [`crate::connection::ConnectionStatus`].
//! Fetch failures are the one category returned from `refresh()`.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for dashsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    InvalidEndpoint = 301,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,
    StoreCorrupted = 410,

    // Fetch errors (5xx)
    FetchFailed = 500,
    FetchStatus = 501,
    FetchDecode = 502,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Fetch errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection Errors
    // ─────────────────────────────────────────────────────────────

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Endpoint could not be parsed
    #[error("Invalid endpoint {url}: {message}")]
    InvalidEndpoint { url: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Protocol / Storage Errors
    // ─────────────────────────────────────────────────────────────

    /// Keyed store contents could not be read back
    #[error("Store at {path} is corrupted: {message}")]
    StoreCorrupted { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────
    // Fetch Errors
    // ─────────────────────────────────────────────────────────────

    /// Fetch request failed before a response was received
    #[error("Fetch from {url} failed: {message}")]
    FetchFailed { url: String, message: String },

    /// Fetch returned a non-success status
    #[error("Fetch from {url} returned HTTP {status}")]
    FetchStatus { url: String, status: u16 },

    /// Fetch response body could not be decoded
    #[error("Failed to decode response from {url}: {message}")]
    FetchDecode { url: String, message: String },

    /// Generic fetch error (for caller-supplied fetch operations)
    #[error("Fetch error: {0}")]
    Fetch(String),

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::ProtocolMalformed,

            Error::WebSocket(_) => ErrorCode::ConnectionFailed,
            Error::InvalidEndpoint { .. } => ErrorCode::InvalidEndpoint,

            Error::StoreCorrupted { .. } => ErrorCode::StoreCorrupted,

            Error::FetchFailed { .. } => ErrorCode::FetchFailed,
            Error::FetchStatus { .. } => ErrorCode::FetchStatus,
            Error::FetchDecode { .. } => ErrorCode::FetchDecode,
            Error::Fetch(_) => ErrorCode::FetchFailed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::FetchStatus { status, .. } => *status >= 500 || *status == 429,
            Error::WebSocket(_)
            | Error::FetchFailed { .. }
            | Error::Fetch(_)
            | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'dashsync config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'dashsync config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::InvalidEndpoint { .. } => Some(
                "Stream endpoints must be ws:// or wss:// URLs."
            ),
            Error::StoreCorrupted { .. } => Some(
                "Delete the store file; it will be recreated on the next run."
            ),
            Error::FetchFailed { .. } => Some(
                "Check your network connection and verify the fetch URL is reachable."
            ),
            Error::FetchStatus { .. } => Some(
                "The fetch endpoint rejected the request. Check the URL and server logs."
            ),
            Error::FetchDecode { .. } => Some(
                "The fetch endpoint must return a JSON document."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = self.suggestion() {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an invalid endpoint error
    pub fn invalid_endpoint(url: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidEndpoint {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a fetch failure for caller-supplied fetch operations
    pub fn fetch(message: impl Into<String>) -> Self {
        Error::Fetch(message.into())
    }
}
