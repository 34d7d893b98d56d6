//! Per-user notification settings: model, lenient decoding, merge-on-write.
//!
//! Stored rows are spreadsheet cells and may be partial or hand-edited.
//! Decoding falls back to the default field by field instead of rejecting
//! the whole row.

use crate::{
    clock::is_known_zone,
    error::NudgeError,
    records::{Collection, Row},
    traits::RowStore,
    window::normalize_hhmm,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub const DEFAULT_HABIT_REMINDER_TIME: &str = "09:00";
pub const DEFAULT_TASK_REMINDER_MINUTES: u32 = 15;
pub const DEFAULT_GOAL_REMINDER_TIME: &str = "20:00";
pub const DEFAULT_DAILY_SUMMARY_TIME: &str = "21:00";
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// One user's notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    /// Master switch. Off until the user opts in.
    pub enabled: bool,
    pub habit_reminder: bool,
    pub habit_reminder_time: String,
    pub task_reminder: bool,
    /// How long before a task's scheduled time the early reminder fires.
    pub task_reminder_minutes: u32,
    pub goal_reminder: bool,
    pub goal_reminder_time: String,
    pub daily_summary: bool,
    pub daily_summary_time: String,
    pub telegram_enabled: bool,
    pub telegram_chat_id: String,
    /// IANA zone name.
    pub timezone: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            habit_reminder: true,
            habit_reminder_time: DEFAULT_HABIT_REMINDER_TIME.to_string(),
            task_reminder: true,
            task_reminder_minutes: DEFAULT_TASK_REMINDER_MINUTES,
            goal_reminder: true,
            goal_reminder_time: DEFAULT_GOAL_REMINDER_TIME.to_string(),
            daily_summary: true,
            daily_summary_time: DEFAULT_DAILY_SUMMARY_TIME.to_string(),
            telegram_enabled: false,
            telegram_chat_id: String::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

/// Partial update. Unspecified fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: Option<bool>,
    pub habit_reminder: Option<bool>,
    pub habit_reminder_time: Option<String>,
    pub task_reminder: Option<bool>,
    pub task_reminder_minutes: Option<u32>,
    pub goal_reminder: Option<bool>,
    pub goal_reminder_time: Option<String>,
    pub daily_summary: Option<bool>,
    pub daily_summary_time: Option<String>,
    pub telegram_enabled: Option<bool>,
    pub telegram_chat_id: Option<String>,
    pub timezone: Option<String>,
}

impl NotificationSettings {
    /// Decode a stored row, substituting defaults for missing or malformed cells.
    pub fn from_row(row: &Row) -> Self {
        let d = Self::default();
        Self {
            enabled: bool_cell(row.get("enabled"), d.enabled),
            habit_reminder: bool_cell(row.get("habitReminder"), d.habit_reminder),
            habit_reminder_time: time_cell(row.get("habitReminderTime"), &d.habit_reminder_time),
            task_reminder: bool_cell(row.get("taskReminder"), d.task_reminder),
            task_reminder_minutes: minutes_cell(
                row.get("taskReminderMinutes"),
                d.task_reminder_minutes,
            ),
            goal_reminder: bool_cell(row.get("goalReminder"), d.goal_reminder),
            goal_reminder_time: time_cell(row.get("goalReminderTime"), &d.goal_reminder_time),
            daily_summary: bool_cell(row.get("dailySummary"), d.daily_summary),
            daily_summary_time: time_cell(row.get("dailySummaryTime"), &d.daily_summary_time),
            telegram_enabled: bool_cell(row.get("telegramEnabled"), d.telegram_enabled),
            telegram_chat_id: row.get("telegramChatId").trim().to_string(),
            timezone: zone_cell(row.get("timezone")),
        }
    }

    /// Write every field into `row` as sheet cells.
    pub fn write_to(&self, row: &mut Row, user_id: &str, updated_at: DateTime<Utc>) {
        row.set("userId", user_id);
        row.set("enabled", self.enabled.to_string());
        row.set("habitReminder", self.habit_reminder.to_string());
        row.set("habitReminderTime", self.habit_reminder_time.as_str());
        row.set("taskReminder", self.task_reminder.to_string());
        row.set("taskReminderMinutes", self.task_reminder_minutes.to_string());
        row.set("goalReminder", self.goal_reminder.to_string());
        row.set("goalReminderTime", self.goal_reminder_time.as_str());
        row.set("dailySummary", self.daily_summary.to_string());
        row.set("dailySummaryTime", self.daily_summary_time.as_str());
        row.set("telegramEnabled", self.telegram_enabled.to_string());
        row.set("telegramChatId", self.telegram_chat_id.as_str());
        row.set("timezone", self.timezone.as_str());
        row.set(
            "updatedAt",
            updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    /// Merge a partial update over these settings.
    ///
    /// Malformed times and unknown zones are ignored (the current, already
    /// valid value stays); an empty zone resets to UTC.
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.enabled {
            self.enabled = v;
        }
        if let Some(v) = update.habit_reminder {
            self.habit_reminder = v;
        }
        if let Some(v) = update.habit_reminder_time {
            merge_time(&mut self.habit_reminder_time, &v, "habitReminderTime");
        }
        if let Some(v) = update.task_reminder {
            self.task_reminder = v;
        }
        if let Some(v) = update.task_reminder_minutes {
            self.task_reminder_minutes = v;
        }
        if let Some(v) = update.goal_reminder {
            self.goal_reminder = v;
        }
        if let Some(v) = update.goal_reminder_time {
            merge_time(&mut self.goal_reminder_time, &v, "goalReminderTime");
        }
        if let Some(v) = update.daily_summary {
            self.daily_summary = v;
        }
        if let Some(v) = update.daily_summary_time {
            merge_time(&mut self.daily_summary_time, &v, "dailySummaryTime");
        }
        if let Some(v) = update.telegram_enabled {
            self.telegram_enabled = v;
        }
        if let Some(v) = update.telegram_chat_id {
            self.telegram_chat_id = v.trim().to_string();
        }
        if let Some(v) = update.timezone {
            let zone = v.trim();
            if zone.is_empty() {
                self.timezone = DEFAULT_TIMEZONE.to_string();
            } else if is_known_zone(zone) {
                self.timezone = zone.to_string();
            } else {
                warn!("ignoring unknown timezone {zone:?}");
            }
        }
    }

    /// Telegram chat to deliver to, if Telegram is switched on and linked.
    pub fn telegram_chat(&self) -> Option<&str> {
        let chat = self.telegram_chat_id.trim();
        (self.telegram_enabled && !chat.is_empty()).then_some(chat)
    }

    /// Whether the server-side sweep should look at this user at all.
    pub fn sweep_eligible(&self) -> bool {
        self.enabled && self.telegram_chat().is_some()
    }
}

fn bool_cell(value: &str, default: bool) -> bool {
    let v = value.trim();
    if v.eq_ignore_ascii_case("true") {
        true
    } else if v.eq_ignore_ascii_case("false") {
        false
    } else {
        default
    }
}

fn time_cell(value: &str, default: &str) -> String {
    normalize_hhmm(value).unwrap_or_else(|| default.to_string())
}

fn minutes_cell(value: &str, default: u32) -> u32 {
    value.trim().parse().unwrap_or(default)
}

fn zone_cell(value: &str) -> String {
    let zone = value.trim();
    if is_known_zone(zone) {
        zone.to_string()
    } else {
        DEFAULT_TIMEZONE.to_string()
    }
}

fn merge_time(field: &mut String, value: &str, name: &str) {
    match normalize_hhmm(value) {
        Some(t) => *field = t,
        None => warn!("ignoring malformed {name} {value:?}"),
    }
}

/// Load a user's settings, or the defaults if none are stored.
pub async fn resolve(store: &dyn RowStore, user_id: &str) -> Result<NotificationSettings, NudgeError> {
    let rows = store
        .find(Collection::NotificationSettings, "userId", user_id)
        .await?;
    Ok(rows
        .first()
        .map(NotificationSettings::from_row)
        .unwrap_or_default())
}

/// Every stored settings row that names a user, in sheet order.
pub async fn list_all(store: &dyn RowStore) -> Result<Vec<(String, NotificationSettings)>, NudgeError> {
    let rows = store.all(Collection::NotificationSettings).await?;
    Ok(rows
        .iter()
        .filter(|row| !row.get("userId").trim().is_empty())
        .map(|row| {
            (
                row.get("userId").trim().to_string(),
                NotificationSettings::from_row(row),
            )
        })
        .collect())
}

/// Merge `update` over the user's current settings and persist the result.
pub async fn update(
    store: &dyn RowStore,
    user_id: &str,
    update: SettingsUpdate,
    now: DateTime<Utc>,
) -> Result<NotificationSettings, NudgeError> {
    let existing = store
        .find(Collection::NotificationSettings, "userId", user_id)
        .await?
        .into_iter()
        .next();

    let mut merged = existing
        .as_ref()
        .map(NotificationSettings::from_row)
        .unwrap_or_default();
    merged.apply(update);

    save(store, user_id, &merged, existing, now).await?;
    Ok(merged)
}

/// Bind a Telegram chat to a user and switch notifications on.
///
/// A user without settings gets every reminder kind on with default times.
pub async fn link_telegram(
    store: &dyn RowStore,
    user_id: &str,
    chat_id: &str,
    now: DateTime<Utc>,
) -> Result<NotificationSettings, NudgeError> {
    let existing = store
        .find(Collection::NotificationSettings, "userId", user_id)
        .await?
        .into_iter()
        .next();

    let mut settings = existing
        .as_ref()
        .map(NotificationSettings::from_row)
        .unwrap_or_default();
    settings.enabled = true;
    settings.telegram_enabled = true;
    settings.telegram_chat_id = chat_id.trim().to_string();

    save(store, user_id, &settings, existing, now).await?;
    info!("linked telegram chat {chat_id} to user {user_id}");
    Ok(settings)
}

async fn save(
    store: &dyn RowStore,
    user_id: &str,
    settings: &NotificationSettings,
    existing: Option<Row>,
    now: DateTime<Utc>,
) -> Result<(), NudgeError> {
    match existing {
        Some(mut row) => {
            settings.write_to(&mut row, user_id, now);
            if !store.update(Collection::NotificationSettings, row.clone()).await? {
                store.append(Collection::NotificationSettings, row).await?;
            }
        }
        None => {
            let mut row = Row::new(&Uuid::new_v4().to_string());
            settings.write_to(&mut row, user_id, now);
            store.append(Collection::NotificationSettings, row).await?;
        }
    }
    Ok(())
}
