//! Shop-local calendar.
//!
//! Every "today" view (stock entries, order usage, movement listing, alert
//! dedup) is cut at the shop's wall-clock midnight, never at UTC midnight.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// The shop-local calendar day an event is attributed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Duration::days(1))
    }
}

impl core::fmt::Display for DayKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl core::str::FromStr for DayKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|e| DomainError::validation(format!("day key must be YYYY-MM-DD: {e}")))
    }
}

/// Day boundary arithmetic for one shop location.
///
/// The shop timezone is modelled as a fixed UTC offset.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShopClock {
    offset: FixedOffset,
}

impl ShopClock {
    /// Largest offset accepted (matches the range real timezones use).
    pub const MAX_OFFSET_MINUTES: i32 = 18 * 60;

    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }

    /// Build from a signed offset in minutes east of UTC.
    pub fn from_offset_minutes(minutes: i32) -> DomainResult<Self> {
        if !(-Self::MAX_OFFSET_MINUTES..=Self::MAX_OFFSET_MINUTES).contains(&minutes) {
            return Err(DomainError::validation(format!(
                "utc offset {minutes} minutes is outside +/-{} minutes",
                Self::MAX_OFFSET_MINUTES
            )));
        }
        FixedOffset::east_opt(minutes * 60)
            .map(Self::new)
            .ok_or_else(|| DomainError::validation(format!("invalid utc offset: {minutes} minutes")))
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Day an instant belongs to in shop-local time.
    pub fn day_key(&self, at: DateTime<Utc>) -> DayKey {
        DayKey(at.with_timezone(&self.offset).date_naive())
    }

    /// UTC instant of shop-local midnight opening `day`.
    pub fn start_of_day(&self, day: DayKey) -> DateTime<Utc> {
        let local_midnight = day.0.and_time(NaiveTime::MIN);
        let utc_naive = local_midnight - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc_naive)
    }

    /// Half-open `[start, end)` UTC window covering `day`.
    pub fn day_bounds(&self, day: DayKey) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_of_day(day), self.start_of_day(day.next()))
    }
}

impl Default for ShopClock {
    fn default() -> Self {
        Self::utc()
    }
}

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Copy, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pinned time for tests and replays; can be moved explicitly.
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
