//! dashsync - realtime data synchronization
//!
//! Keeps one value fresh from three sources:
//! - A WebSocket push stream with capped, fixed-delay reconnects
//! - A fixed-interval poller
//! - Manual refreshes
//!
//! ```ignore
//! let coordinator = SyncCoordinator::start(
//!     SyncOptions::new(serde_json::Value::Null)
//!         .with_stream("wss://dashboard.example.com/live", Decoder::json())
//!         .with_fetcher(HttpFetcher::new("https://dashboard.example.com/api/stats")?)
//!         .with_refresh_interval(Duration::from_secs(30)),
//! );
//! coordinator.refresh().await?;
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod polling;
pub mod store;
pub mod sync;
pub mod version;

pub use connection::{
    CloseEvent, ConnectionConfig, ConnectionError, ConnectionHandler, ConnectionManager,
    ConnectionStatus, Decoder,
};
pub use error::{Error, ErrorCode, Result};
pub use fetch::HttpFetcher;
pub use polling::{PollingConfig, PollingScheduler};
pub use store::{JsonFileStore, KeyedStore, MemoryStore};
pub use sync::{Fetcher, MergePolicy, SyncCoordinator, SyncOptions, SyncSnapshot};
