//! Wall-clock abstraction
//!
//! Files are partitioned by the server's *local* calendar date and record
//! timestamps are local wall-clock time, so everything that asks "what day
//! is it" goes through a [`Clock`]. Tests substitute a [`FixedClock`].

use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};

/// Source of the current local time
pub trait Clock: Send + Sync + 'static {
    /// Current local wall-clock time, millisecond precision
    fn now(&self) -> NaiveDateTime;

    /// Current local calendar date
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The server's local clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        truncate_to_millis(Local::now().naive_local())
    }
}

/// A manually driven clock for tests and replay tooling
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Move the clock to a new instant
    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    /// Advance the clock by a chrono duration
    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drop sub-millisecond precision
pub fn truncate_to_millis(ts: NaiveDateTime) -> NaiveDateTime {
    let millis = ts.nanosecond() / 1_000_000;
    ts.with_nanosecond(millis * 1_000_000).unwrap_or(ts)
}

/// Drop sub-second precision (the dedup bucket)
pub fn truncate_to_second(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").unwrap()
    }

    #[test]
    fn test_fixed_clock_rolls_over_midnight() {
        let clock = FixedClock::new(at("2025-01-01 23:59:59.900"));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());

        clock.advance(chrono::Duration::milliseconds(200));
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 2).unwrap());
    }

    #[test]
    fn test_truncation() {
        let ts = at("2025-01-01 10:00:00.123456");
        assert_eq!(truncate_to_millis(ts), at("2025-01-01 10:00:00.123"));
        assert_eq!(truncate_to_second(ts), at("2025-01-01 10:00:00"));
    }
}
