//! Synchronized state coordinator
//!
//! Combines a [`ConnectionManager`] and a [`PollingScheduler`] into one
//! tracked value:
//! - Push messages are merged in arrival order
//! - Refresh results (manual or polled) are merged in completion order
//! - Every accepted update stamps `last_updated` and fires `on_data`, with
//!   the merged value for pushes and the fetched value for refreshes
//!
//! Push merges and refresh merges are not serialized against each other.
//! Whichever completes first is merged first, and the merge policy is
//! expected to produce a sensible value from any interleaving.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::fetcher::Fetcher;
use super::merge::MergePolicy;
use super::snapshot::SyncSnapshot;
use crate::connection::{
    ConnectionConfig, ConnectionError, ConnectionHandler, ConnectionManager, ConnectionStatus,
    Decoder,
};
use crate::error::Result;
use crate::polling::{PollingConfig, PollingScheduler};

/// Side-effect callback invoked with every accepted value
pub type OnData<T> = Arc<dyn Fn(&T) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────

/// Construction options for a [`SyncCoordinator`]
pub struct SyncOptions<T> {
    initial: T,
    stream: Option<(String, Decoder<T>)>,
    merge: MergePolicy<T>,
    on_data: Option<OnData<T>>,
    fetcher: Option<Arc<dyn Fetcher<T>>>,
    refresh_interval: Option<Duration>,
    auto_refresh: bool,
    connection: ConnectionConfig,
}

impl<T> SyncOptions<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Options with no stream, no fetcher and the replace merge policy
    pub fn new(initial: T) -> Self {
        Self {
            initial,
            stream: None,
            merge: MergePolicy::replace(),
            on_data: None,
            fetcher: None,
            refresh_interval: None,
            auto_refresh: true,
            connection: ConnectionConfig::default(),
        }
    }

    /// Stream updates from `url`, decoding each frame with `decoder`
    pub fn with_stream(mut self, url: impl Into<String>, decoder: Decoder<T>) -> Self {
        self.stream = Some((url.into(), decoder));
        self
    }

    /// Merge policy for both push and refresh paths
    pub fn with_merge(mut self, merge: MergePolicy<T>) -> Self {
        self.merge = merge;
        self
    }

    /// Callback invoked after every accepted update
    ///
    /// Pushed messages pass the merged value; refreshes pass the value as
    /// fetched. Teardown waits for a running callback, so the callback must
    /// not shut down or drop its own coordinator.
    pub fn on_data<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_data = Some(Arc::new(callback));
        self
    }

    /// Source used by `refresh()` and by polling
    pub fn with_fetcher<F>(mut self, fetcher: F) -> Self
    where
        F: Fetcher<T> + 'static,
    {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Poll the fetcher on this period; zero disables polling
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    /// Initial auto-refresh enablement (default on)
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    /// Reconnect and sub-protocol settings for the stream
    pub fn with_connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = config;
        self
    }
}

impl SyncOptions<Message> {
    /// Stream raw frames from `url` without decoding
    pub fn with_raw_stream(self, url: impl Into<String>) -> Self {
        self.with_stream(url, Decoder::raw())
    }
}

// ─────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────

struct SyncState<T> {
    value: T,
    last_updated: Option<DateTime<Utc>>,
    refreshes_in_flight: u32,
    auto_refresh_enabled: bool,
}

struct SyncInner<T> {
    state: RwLock<SyncState<T>>,
    merge: MergePolicy<T>,
    on_data: Option<OnData<T>>,
    fetcher: Option<Arc<dyn Fetcher<T>>>,
    /// Cleared on teardown. Merges hold a read guard for their whole
    /// duration, so clearing it waits out any merge in progress.
    alive: RwLock<bool>,
}

#[derive(Debug, Clone, Copy)]
enum UpdateSource {
    Stream,
    Refresh,
}

impl UpdateSource {
    fn as_str(self) -> &'static str {
        match self {
            UpdateSource::Stream => "stream",
            UpdateSource::Refresh => "refresh",
        }
    }
}

impl<T> SyncInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn is_alive(&self) -> bool {
        *self.alive.read_recursive()
    }

    fn accept(&self, incoming: T, source: UpdateSource) {
        let alive = self.alive.read_recursive();
        if !*alive {
            debug!(source = source.as_str(), "Discarding update after teardown");
            return;
        }

        let fetched = match (source, &self.on_data) {
            (UpdateSource::Refresh, Some(_)) => Some(incoming.clone()),
            _ => None,
        };
        let next = {
            let mut state = self.state.write();
            let next = self.merge.apply(&state.value, incoming);
            state.value = next.clone();
            state.last_updated = Some(next_timestamp(state.last_updated));
            next
        };
        debug!(source = source.as_str(), "Update merged");

        if let Some(on_data) = &self.on_data {
            on_data(fetched.as_ref().unwrap_or(&next));
        }
        drop(alive);
    }

    async fn refresh(&self) -> Result<()> {
        let Some(fetcher) = self.fetcher.clone() else {
            return Ok(());
        };
        if !self.is_alive() {
            return Ok(());
        }

        let result = {
            let _guard = RefreshGuard::enter(self);
            fetcher.fetch().await
        };

        match result {
            Ok(value) => {
                self.accept(value, UpdateSource::Refresh);
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Refresh failed");
                Err(e)
            }
        }
    }
}

/// Keeps `is_refreshing` true while at least one fetch is in flight.
/// Always decrements, including for fetches dropped mid-await or
/// finishing after teardown.
struct RefreshGuard<'a, T> {
    inner: &'a SyncInner<T>,
}

impl<'a, T> RefreshGuard<'a, T> {
    fn enter(inner: &'a SyncInner<T>) -> Self {
        inner.state.write().refreshes_in_flight += 1;
        Self { inner }
    }
}

impl<T> Drop for RefreshGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.inner.state.write();
        state.refreshes_in_flight = state.refreshes_in_flight.saturating_sub(1);
    }
}

/// Timestamps strictly increase even if the wall clock stalls or steps back
fn next_timestamp(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(previous) if now <= previous => previous + chrono::Duration::microseconds(1),
        _ => now,
    }
}

/// Feeds decoded stream messages into the coordinator
struct StreamListener<T> {
    inner: Weak<SyncInner<T>>,
}

impl<T> ConnectionHandler<T> for StreamListener<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn on_message(&self, message: &T, _frame: &Message) {
        if let Some(inner) = self.inner.upgrade() {
            inner.accept(message.clone(), UpdateSource::Stream);
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────

/// Keeps one value fresh from a stream, a poller and manual refreshes
///
/// Dropping the coordinator tears it down: polling stops, any pending
/// reconnect is cancelled, the socket is closed and in-flight completions
/// are discarded.
pub struct SyncCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SyncInner<T>>,
    connection: Option<ConnectionManager<T>>,
    scheduler: Option<PollingScheduler>,
}

impl<T> SyncCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Build the coordinator, connect the stream and start polling
    ///
    /// Must be called from within a tokio runtime. Polling only runs when a
    /// fetcher and a non-zero interval are both configured.
    pub fn start(options: SyncOptions<T>) -> Self {
        let SyncOptions {
            initial,
            stream,
            merge,
            on_data,
            fetcher,
            refresh_interval,
            auto_refresh,
            connection,
        } = options;

        let has_fetcher = fetcher.is_some();
        let inner = Arc::new(SyncInner {
            state: RwLock::new(SyncState {
                value: initial,
                last_updated: None,
                refreshes_in_flight: 0,
                auto_refresh_enabled: auto_refresh,
            }),
            merge,
            on_data,
            fetcher,
            alive: RwLock::new(true),
        });

        let connection = stream.map(|(url, decoder)| {
            let manager = ConnectionManager::new(Some(url), connection, decoder);
            manager.add_listener(Arc::new(StreamListener {
                inner: Arc::downgrade(&inner),
            }));
            manager.connect();
            manager
        });

        let scheduler = match refresh_interval {
            Some(interval) if has_fetcher && !interval.is_zero() => {
                let weak = Arc::downgrade(&inner);
                let scheduler = PollingScheduler::new(
                    PollingConfig {
                        interval,
                        enabled: auto_refresh,
                        immediate: false,
                    },
                    move || spawn_background_refresh(&weak),
                );
                scheduler.set_enabled(auto_refresh);
                Some(scheduler)
            }
            _ => None,
        };

        info!(
            stream = ?connection.as_ref().and_then(|c| c.url()),
            polling_ms = ?scheduler.as_ref().map(|s| s.interval().as_millis() as u64),
            auto_refresh,
            "Sync coordinator started"
        );

        Self {
            inner,
            connection,
            scheduler,
        }
    }

    /// Current tracked value
    pub fn value(&self) -> T {
        self.inner.state.read().value.clone()
    }

    /// Borrow the tracked value without cloning it
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.state.read().value)
    }

    /// When the value last changed through a merge
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.inner.state.read().last_updated
    }

    /// Stream status; `Idle` when no stream is configured
    pub fn status(&self) -> ConnectionStatus {
        self.connection
            .as_ref()
            .map(|c| c.status())
            .unwrap_or_default()
    }

    /// Whether the stream is open
    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Open
    }

    /// Most recent stream error
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.connection.as_ref().and_then(|c| c.last_error())
    }

    /// Whether a refresh fetch is in flight
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.read().refreshes_in_flight > 0
    }

    /// Whether auto-refresh is enabled
    pub fn auto_refresh_enabled(&self) -> bool {
        self.inner.state.read().auto_refresh_enabled
    }

    /// Whether the polling timer is live
    pub fn is_polling(&self) -> bool {
        self.scheduler.as_ref().is_some_and(|s| s.is_active())
    }

    /// Underlying connection manager, for sending frames upstream
    pub fn connection(&self) -> Option<&ConnectionManager<T>> {
        self.connection.as_ref()
    }

    /// Fetch now and merge the result
    ///
    /// Resolves immediately when no fetcher is configured. A fetch failure
    /// is returned to the caller and leaves the value untouched.
    pub async fn refresh(&self) -> Result<()> {
        self.inner.refresh().await
    }

    /// Turn polling on or off
    pub fn set_auto_refresh_enabled(&self, enabled: bool) {
        if !self.inner.is_alive() {
            return;
        }
        self.inner.state.write().auto_refresh_enabled = enabled;
        if let Some(scheduler) = &self.scheduler {
            scheduler.set_enabled(enabled);
        }
        info!(enabled, "Auto-refresh toggled");
    }

    /// Reset the stream's attempt counter and reconnect now
    pub fn reconnect(&self) {
        if let Some(connection) = &self.connection {
            connection.reconnect();
        }
    }

    /// Replace the tracked value with a new cold-start value, dropping
    /// everything merged so far
    pub fn reset(&self, initial: T) {
        if !self.inner.is_alive() {
            return;
        }
        self.inner.state.write().value = initial;
        debug!("Tracked value reset to new initial value");
    }

    /// Capture the current state for rendering
    pub fn snapshot(&self) -> SyncSnapshot<T> {
        let (value, last_updated, is_refreshing, auto_refresh_enabled) = {
            let state = self.inner.state.read();
            (
                state.value.clone(),
                state.last_updated,
                state.refreshes_in_flight > 0,
                state.auto_refresh_enabled,
            )
        };
        let status = self.status();
        SyncSnapshot {
            value,
            last_updated,
            status,
            is_connected: status == ConnectionStatus::Open,
            is_refreshing,
            auto_refresh_enabled,
            last_error: self.last_error().map(|e| e.to_string()),
        }
    }

    /// Tear down: stop polling, cancel reconnects, close the socket, then
    /// mark the coordinator dead. Idempotent.
    ///
    /// Blocks until a merge already in progress (including its `on_data`
    /// call) has finished; nothing is merged or delivered after it returns.
    pub fn shutdown(&self) {
        if !self.inner.is_alive() {
            return;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        if let Some(connection) = &self.connection {
            connection.shutdown();
        }
        *self.inner.alive.write() = false;
        info!("Sync coordinator shut down");
    }
}

impl<T> Drop for SyncCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_background_refresh<T>(inner: &Weak<SyncInner<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let Some(inner) = inner.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        if let Err(e) = inner.refresh().await {
            warn!(error = %e, "Background refresh failed");
        }
    });
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
