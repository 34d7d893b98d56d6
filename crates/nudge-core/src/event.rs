//! Reminder identities: kinds, channels, and deterministic event keys.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every kind of reminder Nudge can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReminderKind {
    HabitReminder,
    TaskBefore,
    TaskNow,
    GoalReminder,
    DailySummary,
}

impl ReminderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HabitReminder => "habit-reminder",
            Self::TaskBefore => "task-before",
            Self::TaskNow => "task-now",
            Self::GoalReminder => "goal-reminder",
            Self::DailySummary => "daily-summary",
        }
    }

    /// Task reminders are scoped to a task; everything else to the user.
    pub fn is_task_scoped(&self) -> bool {
        matches!(self, Self::TaskBefore | Self::TaskNow)
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery channel. Part of the event key, so each channel dedups on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Browser,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "browser" => Ok(Self::Browser),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Build the idempotency key `{date}|{kind}|{scope}|{channel}`.
///
/// `date` is the user's local calendar day. The date, kind and channel never
/// contain `|`, so the scope is recovered unambiguously and distinct inputs
/// always give distinct keys.
pub fn derive_key(date: NaiveDate, kind: ReminderKind, scope_id: &str, channel: ChannelKind) -> String {
    format!(
        "{}|{}|{}|{}",
        date.format("%Y-%m-%d"),
        kind.as_str(),
        scope_id,
        channel.as_str()
    )
}

/// One recorded send. At most one exists per `event_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupEvent {
    pub event_key: String,
    pub user_id: String,
    pub channel: ChannelKind,
    pub sent_at: DateTime<Utc>,
}
