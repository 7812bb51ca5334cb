//! Time sources for the session engine.
//!
//! Every component reads time through a [`Clock`] so tests can drive virtual
//! time deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::types::Timestamp;

/// Source of wall-clock milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// Real wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
///
/// Cloning shares the underlying time, so one `ManualClock` can drive a whole
/// simulated session.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall clock anchored once, then advanced by `tokio::time::Instant`.
///
/// Under `tokio::time::pause()` this clock moves with tokio's virtual time.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_ms: Timestamp,
    anchor: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            anchor_ms: chrono::Utc::now().timestamp_millis(),
            anchor: tokio::time::Instant::now(),
        }
    }

    /// Convert an absolute timestamp from this clock into a tokio instant
    pub fn instant_at(&self, at: Timestamp) -> tokio::time::Instant {
        let offset = at.saturating_sub(self.anchor_ms).max(0) as u64;
        self.anchor + Duration::from_millis(offset)
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> Timestamp {
        self.anchor_ms + self.anchor.elapsed().as_millis() as i64
    }
}

/// Format the age of `timestamp` relative to `now`.
///
/// Returns strings like "just now", "42s ago", "5m ago", "2h ago", "3d ago".
pub fn format_relative(timestamp: Timestamp, now: Timestamp) -> String {
    let seconds = (now - timestamp).max(0) / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;

    if seconds < 5 {
        "just now".to_string()
    } else if seconds < 60 {
        format!("{}s ago", seconds)
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if hours < 24 {
        format!("{}h ago", hours)
    } else {
        format!("{}d ago", hours / 24)
    }
}
