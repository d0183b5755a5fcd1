//! Time provider abstraction
//!
//! Account databases count time in whole days since 1970-01-01. The
//! [`Clock`] trait supplies "today" so that lifecycle state derived from
//! those day counts is reproducible in tests.

use chrono::{Days, NaiveDate, Utc};
use std::fmt::Debug;

/// A source for the current calendar day.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current date (UTC).
    fn today(&self) -> NaiveDate;

    /// Returns the current date as days since the Unix epoch.
    fn today_days(&self) -> i64 {
        days_since_epoch(self.today())
    }
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock frozen at a given date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl FixedClock {
    /// Clock frozen at `days` days after the Unix epoch
    #[must_use]
    pub fn from_days(days: i64) -> Self {
        Self(date_from_days(days).unwrap_or(NaiveDate::MIN))
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Number of days between the Unix epoch and `date`
#[must_use]
pub fn days_since_epoch(date: NaiveDate) -> i64 {
    date.signed_duration_since(epoch()).num_days()
}

/// Date that lies `days` days after the Unix epoch
///
/// Returns `None` for negative counts and for counts beyond the
/// representable calendar.
#[must_use]
pub fn date_from_days(days: i64) -> Option<NaiveDate> {
    u64::try_from(days)
        .ok()
        .and_then(|d| epoch().checked_add_days(Days::new(d)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_counts() {
        let date = NaiveDate::from_ymd_opt(2019, 4, 15).unwrap();
        assert_eq!(days_since_epoch(date), 18001);
        assert_eq!(date_from_days(18001), Some(date));
        assert_eq!(date_from_days(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(date_from_days(-1), None);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::from_days(18010);
        assert_eq!(clock.today_days(), 18010);
        assert_eq!(clock.today(), clock.today());
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.today_days() > 18262);
    }
}
