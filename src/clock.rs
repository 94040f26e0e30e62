//! Millisecond clock seam.
//!
//! Day rotation and the capacity-check cooldown both depend on wall time, so
//! the worker reads time through a trait and tests drive it manually.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{Local, TimeZone};

use crate::config::DAY_MS;

pub trait Clock: Send + Sync {
    /// Current time as milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

/// Wall clock backed by the system time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Local::now().timestamp_millis()
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

/// Truncate a timestamp to the local midnight that starts its calendar day.
///
/// The result names the day's log file and anchors rotation and retention
/// cutoffs. Falls back to UTC-day truncation if the local timezone cannot
/// represent the instant (DST gaps on exotic offsets).
pub fn local_day_start_ms(ts_ms: i64) -> i64 {
    Local
        .timestamp_millis_opt(ts_ms)
        .single()
        .and_then(|dt| dt.date_naive().and_hms_opt(0, 0, 0))
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| ts_ms - ts_ms.rem_euclid(DAY_MS))
}
