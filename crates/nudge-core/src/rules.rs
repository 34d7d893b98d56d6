//! Reminder eligibility rules and message rendering.
//!
//! Everything here is pure: given settings, the user's local time and the
//! user's data, decide which reminders are due right now. Loading the data,
//! dedup and delivery live with the drivers.

use crate::{
    clock::LocalTime,
    event::ReminderKind,
    records::{Habit, HabitLog, Task},
    settings::NotificationSettings,
    window::{format_hhmm, is_due, parse_hhmm},
};
use chrono::NaiveDate;

/// A reminder that is due and ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub kind: ReminderKind,
    /// User id for user-scoped kinds, task id for task-scoped kinds.
    pub scope_id: String,
    pub title: String,
    pub body: String,
}

/// The collaborator data a rule pass may read.
#[derive(Debug, Clone, Default)]
pub struct UserData {
    pub tasks: Vec<Task>,
    pub habits: Vec<Habit>,
    pub logs: Vec<HabitLog>,
}

/// Which collections an evaluation pass will actually look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DataNeeds {
    pub tasks: bool,
    pub habits: bool,
}

/// Figure out what to load before calling [`evaluate`].
pub fn data_needs(settings: &NotificationSettings, local: &LocalTime, window: u32) -> DataNeeds {
    if !settings.enabled {
        return DataNeeds::default();
    }
    let summary = daily_summary_due(settings, &local.hhmm, window);
    DataNeeds {
        tasks: settings.task_reminder || summary,
        habits: summary,
    }
}

impl DataNeeds {
    /// The collections a single reminder kind is computed from.
    pub fn of(kind: ReminderKind) -> Self {
        match kind {
            ReminderKind::HabitReminder | ReminderKind::GoalReminder => Self::default(),
            ReminderKind::TaskBefore | ReminderKind::TaskNow => Self {
                tasks: true,
                habits: false,
            },
            ReminderKind::DailySummary => Self {
                tasks: true,
                habits: true,
            },
        }
    }

    pub fn intersects(&self, other: DataNeeds) -> bool {
        (self.tasks && other.tasks) || (self.habits && other.habits)
    }
}

/// Run every rule in a stable order: habit, tasks, goal, summary.
pub fn evaluate(
    settings: &NotificationSettings,
    user_id: &str,
    local: &LocalTime,
    window: u32,
    data: &UserData,
) -> Vec<Reminder> {
    let mut due = Vec::new();
    due.extend(habit_reminder(settings, user_id, &local.hhmm, window));
    for task in &data.tasks {
        due.extend(task_reminders(settings, task, local, window));
    }
    due.extend(goal_reminder(settings, user_id, &local.hhmm, window));
    if daily_summary_due(settings, &local.hhmm, window) {
        let counts = SummaryCounts::tally(&data.habits, &data.logs, &data.tasks, local.date);
        due.push(daily_summary(user_id, &counts));
    }
    due
}

pub fn habit_reminder(
    settings: &NotificationSettings,
    user_id: &str,
    now: &str,
    window: u32,
) -> Option<Reminder> {
    (settings.enabled
        && settings.habit_reminder
        && is_due(now, &settings.habit_reminder_time, window))
    .then(|| Reminder {
        kind: ReminderKind::HabitReminder,
        scope_id: user_id.to_string(),
        title: "🎯 Time to check off your habits!".to_string(),
        body: "Open the app and mark the habits you completed today.".to_string(),
    })
}

pub fn goal_reminder(
    settings: &NotificationSettings,
    user_id: &str,
    now: &str,
    window: u32,
) -> Option<Reminder> {
    (settings.enabled && settings.goal_reminder && is_due(now, &settings.goal_reminder_time, window))
        .then(|| Reminder {
            kind: ReminderKind::GoalReminder,
            scope_id: user_id.to_string(),
            title: "🌟 Check in on your goals!".to_string(),
            body: "Take a minute to revisit your goals and dreams.".to_string(),
        })
}

/// `scheduled` minus `minutes_before`, or `None` if that lands before midnight.
pub fn task_reminder_time(scheduled: &str, minutes_before: u32) -> Option<String> {
    let at = parse_hhmm(scheduled)?;
    at.checked_sub(minutes_before).map(format_hhmm)
}

/// The early (`task-before`) and on-time (`task-now`) reminders for one task.
///
/// The two are independent and may both fire for the same task.
pub fn task_reminders(
    settings: &NotificationSettings,
    task: &Task,
    local: &LocalTime,
    window: u32,
) -> Vec<Reminder> {
    let mut due = Vec::new();
    if !settings.enabled || !settings.task_reminder {
        return due;
    }
    if task.completed || task.scheduled_time.is_empty() || !task.is_due_on(local.date) {
        return due;
    }
    if parse_hhmm(&task.scheduled_time).is_none() {
        return due;
    }

    let minutes = settings.task_reminder_minutes;
    if let Some(at) = task_reminder_time(&task.scheduled_time, minutes) {
        if is_due(&local.hhmm, &at, window) {
            due.push(Reminder {
                kind: ReminderKind::TaskBefore,
                scope_id: task.id.clone(),
                title: format!("⏰ Task in {minutes} min"),
                body: format!("{}: scheduled for {}", task.title, task.scheduled_time),
            });
        }
    }

    if is_due(&local.hhmm, &task.scheduled_time, window) {
        due.push(Reminder {
            kind: ReminderKind::TaskNow,
            scope_id: task.id.clone(),
            title: "🔔 Time for your task!".to_string(),
            body: format!("{}: now, {}", task.title, task.scheduled_time),
        });
    }
    due
}

pub fn daily_summary_due(settings: &NotificationSettings, now: &str, window: u32) -> bool {
    settings.enabled && settings.daily_summary && is_due(now, &settings.daily_summary_time, window)
}

/// Live aggregates rendered into the daily summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryCounts {
    pub active_habits: usize,
    pub completed_habits: usize,
    pub completed_tasks: usize,
    pub pending_tasks: usize,
}

impl SummaryCounts {
    /// A habit counts as done if any completed log for `today` references it.
    pub fn tally(habits: &[Habit], logs: &[HabitLog], tasks: &[Task], today: NaiveDate) -> Self {
        let today = today.format("%Y-%m-%d").to_string();
        let active: Vec<&Habit> = habits.iter().filter(|h| h.is_active).collect();
        let completed_habits = active
            .iter()
            .filter(|h| {
                logs.iter()
                    .any(|l| l.date == today && l.completed && l.habit_id == h.id)
            })
            .count();
        let completed_tasks = tasks.iter().filter(|t| t.completed).count();
        Self {
            active_habits: active.len(),
            completed_habits,
            completed_tasks,
            pending_tasks: tasks.len() - completed_tasks,
        }
    }
}

pub fn daily_summary(user_id: &str, counts: &SummaryCounts) -> Reminder {
    Reminder {
        kind: ReminderKind::DailySummary,
        scope_id: user_id.to_string(),
        title: "📊 Daily summary".to_string(),
        body: format!(
            "Habits: {}/{} ✓ | Tasks completed: {} | Remaining: {}",
            counts.completed_habits,
            counts.active_habits,
            counts.completed_tasks,
            counts.pending_tasks
        ),
    }
}
