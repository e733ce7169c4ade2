// Sync window planning: how far one pass may advance a checkpoint.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Half-open range `[from, to)` processed by one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    pub fn is_empty(&self) -> bool {
        self.to <= self.from
    }
}

/// `to = min(now, last_processed + max_window)`, never earlier than `from`, so a
/// project that stalled for weeks catches up one bounded window per pass.
/// A window too large to add to `last_processed` is treated as unbounded.
pub fn compute_range(
    last_processed: DateTime<Utc>,
    now: DateTime<Utc>,
    max_window: Duration,
) -> SyncWindow {
    let to = match last_processed.checked_add_signed(max_window) {
        Some(capped) if capped <= now => capped,
        _ => now,
    };
    SyncWindow {
        from: last_processed,
        to: to.max(last_processed),
    }
}
