//! Streaming connection management
//!
//! Owns a single WebSocket connection to an endpoint:
//! - Status tracking (idle, connecting, open, closed, error)
//! - Fixed-delay reconnection with a hard attempt cap
//! - Frame decoding into a caller-chosen payload type
//! - Listener hooks for open/close/error/message

mod handler;
mod manager;

pub use handler::*;
pub use manager::*;
