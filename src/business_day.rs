//! Business-day calendar
//!
//! Everything that asks "what is today?" goes through [`BusinessDay`]:
//! the start of the local day (assignment batches are keyed on it), the
//! next expiry instant for a fresh assignment, and the time-of-day bucket
//! used by scoring. Keeping the three accessors on one type means the UTC
//! offset is encoded exactly once.

use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::MissionError;

/// KST offset from UTC in seconds
pub const KST_OFFSET_SECS: i32 = 9 * 3600;

/// Local hour when assignments expire
pub const DEFAULT_EXPIRY_HOUR: u32 = 3;

/// Time-of-day bucket used to bias scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeBucket {
    /// Bucket for a local hour (0-23)
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            5..=11 => TimeBucket::Morning,
            12..=16 => TimeBucket::Afternoon,
            17..=20 => TimeBucket::Evening,
            _ => TimeBucket::Night,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeBucket::Morning => "morning",
            TimeBucket::Afternoon => "afternoon",
            TimeBucket::Evening => "evening",
            TimeBucket::Night => "night",
        }
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-offset calendar that defines "today" and assignment expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessDay {
    offset_secs: i32,
    expiry_hour: u32,
}

impl BusinessDay {
    /// Create a calendar for a whole-hour UTC offset and local expiry hour
    pub fn new(utc_offset_hours: i32, expiry_hour: u32) -> Result<Self, MissionError> {
        if !(-12..=14).contains(&utc_offset_hours) {
            return Err(MissionError::Config(format!(
                "utc_offset_hours must be within -12..=14, got {}",
                utc_offset_hours
            )));
        }
        if expiry_hour > 23 {
            return Err(MissionError::Config(format!(
                "expiry_hour must be within 0..=23, got {}",
                expiry_hour
            )));
        }

        Ok(Self {
            offset_secs: utc_offset_hours * 3600,
            expiry_hour,
        })
    }

    /// Korea Standard Time, expiring at 03:00
    pub fn kst() -> Self {
        Self {
            offset_secs: KST_OFFSET_SECS,
            expiry_hour: DEFAULT_EXPIRY_HOUR,
        }
    }

    fn offset(&self) -> Duration {
        Duration::seconds(self.offset_secs as i64)
    }

    fn to_local(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + self.offset()
    }

    fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&(local - self.offset()))
    }

    /// Instant at which the local calendar day containing `now` began
    pub fn start_of_day(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let midnight = self.to_local(now).date().and_time(NaiveTime::MIN);
        self.from_local(midnight)
    }

    /// First local `expiry_hour:00` strictly after `now`
    pub fn next_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let local = self.to_local(now);
        let mut expiry = local.date().and_time(NaiveTime::MIN) + Duration::hours(self.expiry_hour as i64);
        if expiry <= local {
            expiry += Duration::days(1);
        }
        self.from_local(expiry)
    }

    /// Time-of-day bucket for `now` in local time
    pub fn bucket(&self, now: DateTime<Utc>) -> TimeBucket {
        TimeBucket::from_hour(self.to_local(now).hour())
    }
}

impl Default for BusinessDay {
    fn default() -> Self {
        Self::kst()
    }
}

/// Wall-clock source, injectable for tests
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_start_of_day_crosses_utc_date() {
        let day = BusinessDay::kst();
        // 2024-03-01 16:30 UTC is 2024-03-02 01:30 KST
        let start = day.start_of_day(utc(2024, 3, 1, 16, 30));
        assert_eq!(start, utc(2024, 3, 1, 15, 0));

        // 2024-03-01 14:59 UTC is still 2024-03-01 23:59 KST
        let start = day.start_of_day(utc(2024, 3, 1, 14, 59));
        assert_eq!(start, utc(2024, 2, 29, 15, 0));
    }

    #[test]
    fn test_next_expiry_before_and_after_three_am() {
        let day = BusinessDay::kst();
        // 01:00 KST -> 03:00 KST the same local day (18:00 UTC)
        assert_eq!(day.next_expiry(utc(2024, 3, 1, 16, 0)), utc(2024, 3, 1, 18, 0));
        // 10:00 KST -> 03:00 KST next day
        assert_eq!(day.next_expiry(utc(2024, 3, 1, 1, 0)), utc(2024, 3, 1, 18, 0));
        // exactly 03:00 KST rolls to the following day
        assert_eq!(day.next_expiry(utc(2024, 3, 1, 18, 0)), utc(2024, 3, 2, 18, 0));
    }

    #[test]
    fn test_expiry_is_always_after_now() {
        let day = BusinessDay::kst();
        let mut now = utc(2024, 1, 1, 0, 0);
        for _ in 0..48 {
            assert!(day.next_expiry(now) > now);
            assert!(day.start_of_day(now) <= now);
            now += Duration::minutes(37);
        }
    }

    #[test]
    fn test_bucket_uses_local_hour() {
        let day = BusinessDay::kst();
        assert_eq!(day.bucket(utc(2024, 3, 1, 0, 0)), TimeBucket::Morning); // 09 KST
        assert_eq!(day.bucket(utc(2024, 3, 1, 4, 0)), TimeBucket::Afternoon); // 13 KST
        assert_eq!(day.bucket(utc(2024, 3, 1, 9, 0)), TimeBucket::Evening); // 18 KST
        assert_eq!(day.bucket(utc(2024, 3, 1, 14, 0)), TimeBucket::Night); // 23 KST
        assert_eq!(TimeBucket::from_hour(4), TimeBucket::Night);
        assert_eq!(TimeBucket::from_hour(5), TimeBucket::Morning);
    }

    #[test]
    fn test_new_validates_ranges() {
        assert!(BusinessDay::new(9, 3).is_ok());
        assert!(BusinessDay::new(15, 3).is_err());
        assert!(BusinessDay::new(0, 24).is_err());
        assert_eq!(BusinessDay::new(9, 3).unwrap(), BusinessDay::kst());
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::new(utc(2024, 3, 1, 0, 0));
        clock.advance(Duration::hours(2));
        assert_eq!(clock.now(), utc(2024, 3, 1, 2, 0));
        clock.set(utc(2025, 1, 1, 0, 0));
        assert_eq!(clock.now(), utc(2025, 1, 1, 0, 0));
    }
}
