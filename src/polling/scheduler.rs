//! Polling scheduler
//!
//! Holds at most one live timer task. The callback runs on the timer task,
//! so it should hand long work off (e.g. `tokio::spawn`) rather than block.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Polling callback
pub type PollCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration for a polling scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollingConfig {
    /// Period between callback invocations
    pub interval: Duration,

    /// Whether polling may run at all
    pub enabled: bool,

    /// Fire once immediately whenever polling is (re-)enabled
    pub immediate: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
            immediate: false,
        }
    }
}

/// Invokes a callback on a fixed period
pub struct PollingScheduler {
    callback: PollCallback,
    interval: Duration,
    immediate: bool,
    enabled: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl PollingScheduler {
    /// Create a scheduler; nothing runs until `start()` or `set_enabled(true)`
    pub fn new<F>(config: PollingConfig, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
            interval: config.interval,
            immediate: config.immediate,
            enabled: AtomicBool::new(config.enabled),
            timer: Mutex::new(None),
        }
    }

    /// Begin periodic invocation; no-op when disabled or already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if !self.is_enabled() || self.interval.is_zero() {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let callback = Arc::clone(&self.callback);
        let period = self.interval;
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        }));

        debug!(interval_ms = period.as_millis() as u64, "Polling started");
    }

    /// Cancel the timer; safe to call when not running
    pub fn stop(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
            debug!("Polling stopped");
        }
    }

    /// Invoke the callback now without touching the schedule
    pub fn trigger(&self) {
        (self.callback)();
    }

    /// Enable or disable polling
    ///
    /// Disabling stops an active timer. Enabling fires once immediately when
    /// configured with `immediate`, then (re)starts the schedule. Enabling an
    /// already running scheduler does nothing.
    pub fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        if !enabled {
            self.stop();
            return;
        }
        if was_enabled && self.is_active() {
            return;
        }
        if self.immediate {
            self.trigger();
        }
        self.start();
    }

    /// Whether polling is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether a timer is currently live
    pub fn is_active(&self) -> bool {
        self.timer.lock().is_some()
    }

    /// Configured period
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
