//! Time model.
//!
//! All timestamps are UTC `chrono::DateTime`s.  The engine never reads the
//! system clock directly: "now" comes from an injected [`Clock`] so that
//! staleness, ETA and default-timestamp behaviour are deterministic in tests.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An absolute instant in UTC.
pub type Timestamp = DateTime<Utc>;

/// Seconds from `earlier` to `later` as a float (negative if reversed).
#[inline]
pub fn secs_between(earlier: Timestamp, later: Timestamp) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Minutes from `earlier` to `later` as a float (negative if reversed).
#[inline]
pub fn minutes_between(earlier: Timestamp, later: Timestamp) -> f64 {
    secs_between(earlier, later) / 60.0
}

/// `at + secs`, rounded to the millisecond.
#[inline]
pub fn add_secs(at: Timestamp, secs: f64) -> Timestamp {
    at + Duration::milliseconds((secs * 1000.0).round() as i64)
}

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of "now".
///
/// Implementations must be `Send + Sync`; the engine shares one clock across
/// every ingest thread.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, at: Timestamp) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── TimeRange ─────────────────────────────────────────────────────────────────

/// A half-open window `[from, to)`.  Either bound may be absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: Option<Timestamp>,
    pub to:   Option<Timestamp>,
}

impl TimeRange {
    /// The unbounded range.
    pub const ALL: TimeRange = TimeRange { from: None, to: None };

    pub fn new(from: Timestamp, to: Timestamp) -> Self {
        Self { from: Some(from), to: Some(to) }
    }

    #[inline]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.from.is_none_or(|f| at >= f) && self.to.is_none_or(|t| at < t)
    }

    /// `true` if `from >= to` (nothing can match).
    pub fn is_empty(&self) -> bool {
        matches!((self.from, self.to), (Some(f), Some(t)) if f >= t)
    }
}
