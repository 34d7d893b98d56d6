//! Timezone-aware wall clock.
//!
//! Reminder evaluation never looks at the host's local time. The current
//! instant comes from a [`Clock`] and is projected into the user's IANA zone.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// The user's local calendar day and time of day at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTime {
    pub date: NaiveDate,
    /// Zero-padded `HH:MM`.
    pub hhmm: String,
}

impl LocalTime {
    /// `YYYY-MM-DD`, the form stored in deadlines and habit logs.
    pub fn date_key(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}

/// Parse an IANA zone name, or `None` if unknown.
pub fn parse_zone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// True if `name` is a zone we can evaluate in.
pub fn is_known_zone(name: &str) -> bool {
    parse_zone(name).is_some()
}

/// Project `now` into `zone`. Unknown zones are evaluated as UTC.
pub fn local_time(now: DateTime<Utc>, zone: &str) -> LocalTime {
    let tz = parse_zone(zone).unwrap_or_else(|| {
        warn!("unknown timezone {zone:?}, evaluating in UTC");
        Tz::UTC
    });
    let local = now.with_timezone(&tz);
    LocalTime {
        date: local.date_naive(),
        hhmm: local.format("%H:%M").to_string(),
    }
}
