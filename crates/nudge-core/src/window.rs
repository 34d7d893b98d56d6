//! Time-of-day parsing and the forward-only "is due" window check.
//!
//! All times are wall-clock `HH:MM` strings in the user's own timezone.
//! The window only opens at the target minute and stays open for
//! `window_minutes` after it, so any poll cadence up to the window width
//! observes every target exactly once per day.

/// Window used by the server-side sweep, which ticks every few minutes.
pub const SWEEP_WINDOW_MINUTES: u32 = 5;

/// Window used by the client poll loop, which ticks every 60 seconds.
pub const CLIENT_WINDOW_MINUTES: u32 = 2;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parse `HH:MM` into minutes since midnight.
///
/// Accepts a one- or two-digit hour (`9:05`, `09:05`) and a two-digit minute.
/// Anything else, including out-of-range values, yields `None`.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let (hours, minutes) = value.trim().split_once(':')?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return None;
    }
    if !hours.bytes().all(|b| b.is_ascii_digit()) || !minutes.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    let h: u32 = hours.parse().ok()?;
    let m: u32 = minutes.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// Format minutes since midnight as zero-padded `HH:MM`.
pub fn format_hhmm(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Normalize a time-of-day string, or `None` if it is not well-formed.
pub fn normalize_hhmm(value: &str) -> Option<String> {
    parse_hhmm(value).map(format_hhmm)
}

/// True iff `now` is at or up to `window_minutes` after `target`.
///
/// Malformed input on either side is never due.
pub fn is_due(now: &str, target: &str, window_minutes: u32) -> bool {
    match (parse_hhmm(now), parse_hhmm(target)) {
        (Some(now), Some(target)) => is_due_minutes(now, target, window_minutes),
        _ => false,
    }
}

/// Minute-level form of [`is_due`].
pub fn is_due_minutes(now: u32, target: u32, window_minutes: u32) -> bool {
    now >= target && now - target <= window_minutes
}
