//! Spreadsheet-style rows and the typed views the reminder rules read.
//!
//! Every cell is a string, exactly as it sits in the sheet. Typed records
//! are decoded leniently: a missing cell reads as empty.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A named collection (one sheet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    NotificationSettings,
    Tasks,
    Habits,
    HabitLogs,
    TelegramLinkTokens,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotificationSettings => "NotificationSettings",
            Self::Tasks => "Tasks",
            Self::Habits => "Habits",
            Self::HabitLogs => "HabitLogs",
            Self::TelegramLinkTokens => "TelegramLinkTokens",
        }
    }
}

/// One row: a stable id plus named string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub cells: BTreeMap<String, String>,
}

impl Row {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            cells: BTreeMap::new(),
        }
    }

    /// Cell value, or `""` when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        self.cells.insert(column.to_string(), value.into());
    }

    /// Builder form of [`Row::set`].
    pub fn with(mut self, column: &str, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }
}

/// Sheet booleans are `"true"` / `"TRUE"`; anything else is false.
pub fn cell_is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// A task as the reminder rules see it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub completed: bool,
    /// `HH:MM` or empty.
    pub scheduled_time: String,
    /// `YYYY-MM-DD` or empty.
    pub deadline: String,
}

impl Task {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.id.clone(),
            user_id: row.get("userId").to_string(),
            title: row.get("title").to_string(),
            completed: cell_is_true(row.get("completed")),
            scheduled_time: row.get("scheduledTime").trim().to_string(),
            deadline: row.get("deadline").trim().to_string(),
        }
    }

    /// Due today iff there is no deadline or the deadline is `today`.
    pub fn is_due_on(&self, today: NaiveDate) -> bool {
        self.deadline.is_empty() || self.deadline == today.format("%Y-%m-%d").to_string()
    }
}

/// A habit definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub is_active: bool,
}

impl Habit {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.id.clone(),
            user_id: row.get("userId").to_string(),
            name: row.get("name").to_string(),
            is_active: cell_is_true(row.get("isActive")),
        }
    }
}

/// One day's check-in for a habit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HabitLog {
    pub id: String,
    pub habit_id: String,
    pub user_id: String,
    /// `YYYY-MM-DD`.
    pub date: String,
    pub completed: bool,
}

impl HabitLog {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.id.clone(),
            habit_id: row.get("habitId").to_string(),
            user_id: row.get("userId").to_string(),
            date: row.get("date").trim().to_string(),
            completed: cell_is_true(row.get("completed")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_missing_cell_is_empty() {
        let row = Row::new("r1").with("title", "Write report");
        assert_eq!(row.get("title"), "Write report");
        assert_eq!(row.get("deadline"), "");
    }

    #[test]
    fn test_cell_is_true() {
        assert!(cell_is_true("true"));
        assert!(cell_is_true("TRUE"));
        assert!(!cell_is_true("false"));
        assert!(!cell_is_true("yes"));
        assert!(!cell_is_true(""));
    }

    #[test]
    fn test_task_due_today_rule() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let task = |deadline: &str| {
            Task::from_row(&Row::new("t").with("deadline", deadline))
        };
        assert!(task("").is_due_on(today));
        assert!(task("2026-03-01").is_due_on(today));
        assert!(!task("2026-02-28").is_due_on(today), "past deadline");
        assert!(!task("2026-03-02").is_due_on(today), "future deadline");
    }

    #[test]
    fn test_task_from_row() {
        let row = Row::new("t1")
            .with("userId", "u1")
            .with("title", "Call mom")
            .with("completed", "FALSE")
            .with("scheduledTime", " 14:00 ");
        let task = Task::from_row(&row);
        assert_eq!(task.id, "t1");
        assert_eq!(task.user_id, "u1");
        assert!(!task.completed);
        assert_eq!(task.scheduled_time, "14:00");
    }
}
