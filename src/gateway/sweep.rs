//! Server-side sweep over every linked user (Telegram only).

use super::notifier::{Notifier, Target};
use super::Gateway;
use nudge_core::{error::NudgeError, settings, traits::Channel};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

/// Errors kept in a report; the count covers all of them.
pub const MAX_REPORTED_ERRORS: usize = 20;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub success: bool,
    pub checked_users: usize,
    pub sent_count: usize,
    pub errors_count: usize,
    pub errors: Vec<String>,
}

/// One pass over all users with notifications on and a linked chat.
///
/// Per-user failures are collected; only failing to list users aborts.
/// A user whose data cannot be read still gets the reminders that need none.
pub async fn sweep(
    notifier: &Notifier,
    telegram: Option<&Arc<dyn Channel>>,
    window: u32,
) -> Result<SweepReport, NudgeError> {
    let telegram = telegram
        .ok_or_else(|| NudgeError::Config("telegram is not configured".into()))?;

    let users = settings::list_all(notifier.store()).await?;
    let mut report = SweepReport {
        success: true,
        ..Default::default()
    };
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (user_id, user_settings) in users {
        if !seen.insert(user_id.clone()) || !user_settings.sweep_eligible() {
            continue;
        }
        let Some(chat) = user_settings.telegram_chat() else {
            continue;
        };
        report.checked_users += 1;

        let targets = [Target::new(telegram.clone(), chat)];
        let outcome = notifier
            .run_for_user(&user_id, &user_settings, window, &targets)
            .await;
        report.sent_count += outcome.sent;
        errors.extend(outcome.failures.into_iter().map(|f| format!("{user_id}: {f}")));
    }

    report.errors_count = errors.len();
    errors.truncate(MAX_REPORTED_ERRORS);
    report.errors = errors;

    info!(
        "sweep: checked {} users, sent {}, errors {}",
        report.checked_users, report.sent_count, report.errors_count
    );
    Ok(report)
}

impl Gateway {
    /// Background task: sweep every `interval_secs`.
    pub(super) async fn sweep_loop(
        notifier: Arc<Notifier>,
        telegram: Option<Arc<dyn Channel>>,
        interval_secs: u64,
        window: u32,
    ) {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;

            if let Err(e) = sweep(&notifier, telegram.as_ref(), window).await {
                error!("sweep failed: {e}");
            }
        }
    }
}
