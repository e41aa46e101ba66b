//! Point-in-time view of a coordinator, for rendering

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::ConnectionStatus;

/// Everything a refresh-controls view needs, captured at once
#[derive(Debug, Clone, Serialize)]
pub struct SyncSnapshot<T> {
    pub value: T,
    pub last_updated: Option<DateTime<Utc>>,
    pub status: ConnectionStatus,
    pub is_connected: bool,
    pub is_refreshing: bool,
    pub auto_refresh_enabled: bool,
    pub last_error: Option<String>,
}

impl<T> SyncSnapshot<T> {
    /// One-line summary such as `Updated 5 seconds ago | stream open | auto-refresh on`
    pub fn status_line(&self, now: DateTime<Utc>) -> String {
        let updated = match self.last_updated {
            Some(at) => format!("Updated {}", format_ago(at, now)),
            None => "Waiting for updates".to_string(),
        };

        let mut parts = vec![updated, format!("stream {}", self.status)];
        parts.push(if self.auto_refresh_enabled {
            "auto-refresh on".to_string()
        } else {
            "auto-refresh paused".to_string()
        });
        if self.is_refreshing {
            parts.push("refreshing".to_string());
        }
        parts.join(" | ")
    }
}

/// Coarse relative time, e.g. "just now", "3 minutes ago"
pub fn format_ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    let (amount, unit) = match secs {
        0..=4 => return "just now".to_string(),
        5..=59 => (secs, "second"),
        60..=3_599 => (secs / 60, "minute"),
        3_600..=86_399 => (secs / 3_600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}
