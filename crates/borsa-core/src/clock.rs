//! Time source shared by caches and providers.

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// Time zone of Borsa İstanbul. Upstream query parameters and calendar logic use it.
pub const MARKET_TZ: Tz = chrono_tz::Europe::Istanbul;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the current instant in the market time zone.
    fn market_now(&self) -> DateTime<Tz> {
        self.now().with_timezone(&MARKET_TZ)
    }
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used to test expiry and calendar logic.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::seconds(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
    }

    #[test]
    fn test_market_now_is_istanbul() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap());
        // Istanbul is UTC+3 all year round.
        assert_eq!(clock.market_now().hour(), 12);
    }
}
