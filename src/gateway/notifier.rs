//! The reminder engine shared by the sweep and the client poll driver.
//!
//! Per user: compute local time, load only the data the due rules need,
//! evaluate, then for every (reminder, channel) check the ledger, send under
//! a timeout, and record. A transport failure leaves the ledger untouched so
//! a later tick retries.

use chrono::{DateTime, Utc};
use nudge_core::{
    clock::{local_time, Clock},
    error::NudgeError,
    event::{derive_key, DedupEvent},
    message::Notification,
    records::{Collection, Habit, HabitLog, Task},
    rules::{self, DataNeeds, UserData},
    settings::NotificationSettings,
    traits::{Channel, DedupLedger, RowStore},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One delivery destination for a pass.
#[derive(Clone)]
pub struct Target {
    pub channel: Arc<dyn Channel>,
    pub recipient: String,
}

impl Target {
    pub fn new(channel: Arc<dyn Channel>, recipient: &str) -> Self {
        Self {
            channel,
            recipient: recipient.to_string(),
        }
    }
}

/// Result of one user's pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub sent: usize,
    /// Already in the ledger.
    pub skipped: usize,
    /// Transport or ledger failures, one line each.
    pub failures: Vec<String>,
}

pub struct Notifier {
    store: Arc<dyn RowStore>,
    ledger: Arc<dyn DedupLedger>,
    clock: Arc<dyn Clock>,
    send_timeout: Duration,
}

impl Notifier {
    pub fn new(
        store: Arc<dyn RowStore>,
        ledger: Arc<dyn DedupLedger>,
        clock: Arc<dyn Clock>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            send_timeout,
        }
    }

    pub fn store(&self) -> &dyn RowStore {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Read the collaborator collections a pass needs.
    ///
    /// A collection that cannot be read is left empty and flagged in the
    /// returned [`DataNeeds`]; its error goes to `failures`.
    async fn load_data(
        &self,
        user_id: &str,
        needs: DataNeeds,
        failures: &mut Vec<String>,
    ) -> (UserData, DataNeeds) {
        let mut data = UserData::default();
        let mut unavailable = DataNeeds::default();
        if needs.tasks {
            match self.store.find(Collection::Tasks, "userId", user_id).await {
                Ok(rows) => data.tasks = rows.iter().map(Task::from_row).collect(),
                Err(e) => {
                    warn!("user {user_id}: tasks unavailable: {e}");
                    failures.push(format!("tasks: {e}"));
                    unavailable.tasks = true;
                }
            }
        }
        if needs.habits {
            let loaded = async {
                let habits = self.store.find(Collection::Habits, "userId", user_id).await?;
                let logs = self
                    .store
                    .find(Collection::HabitLogs, "userId", user_id)
                    .await?;
                Ok::<_, NudgeError>((habits, logs))
            }
            .await;
            match loaded {
                Ok((habits, logs)) => {
                    data.habits = habits.iter().map(Habit::from_row).collect();
                    data.logs = logs.iter().map(HabitLog::from_row).collect();
                }
                Err(e) => {
                    warn!("user {user_id}: habits unavailable: {e}");
                    failures.push(format!("habits: {e}"));
                    unavailable.habits = true;
                }
            }
        }
        (data, unavailable)
    }

    /// Evaluate every rule for one user and deliver what is due to `targets`.
    pub async fn run_for_user(
        &self,
        user_id: &str,
        settings: &NotificationSettings,
        window: u32,
        targets: &[Target],
    ) -> Outcome {
        let mut outcome = Outcome::default();
        if !settings.enabled || targets.is_empty() {
            return outcome;
        }

        let local = local_time(self.clock.now(), &settings.timezone);
        let needs = rules::data_needs(settings, &local, window);
        let (data, unavailable) = self
            .load_data(user_id, needs, &mut outcome.failures)
            .await;
        // Rules that read a collection we failed to load are skipped this pass;
        // the rest still go out.
        let due: Vec<_> = rules::evaluate(settings, user_id, &local, window, &data)
            .into_iter()
            .filter(|r| !DataNeeds::of(r.kind).intersects(unavailable))
            .collect();

        for reminder in &due {
            for target in targets {
                let channel = target.channel.kind();
                let key = derive_key(local.date, reminder.kind, &reminder.scope_id, channel);

                match self.ledger.has_sent(&key).await {
                    Ok(true) => {
                        debug!("skip {key}: already sent");
                        outcome.skipped += 1;
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("ledger check for {key} failed: {e}");
                        outcome.failures.push(format!("{key}: {e}"));
                        continue;
                    }
                }

                let notification =
                    Notification::new(&reminder.title, &reminder.body, &target.recipient, &key);
                let sent =
                    tokio::time::timeout(self.send_timeout, target.channel.send(&notification))
                        .await;

                match sent {
                    Ok(Ok(())) => {
                        info!("sent {key} via {}", target.channel.name());
                        outcome.sent += 1;
                        let event = DedupEvent {
                            event_key: key.clone(),
                            user_id: user_id.to_string(),
                            channel,
                            sent_at: self.clock.now(),
                        };
                        if let Err(e) = self.ledger.record_sent(&event).await {
                            warn!("sent {key} but could not record it: {e}");
                            outcome.failures.push(format!("{key}: record failed: {e}"));
                        }
                    }
                    Ok(Err(e)) => {
                        warn!("send {key} via {} failed: {e}", target.channel.name());
                        outcome.failures.push(format!("{key}: {e}"));
                    }
                    Err(_) => {
                        warn!(
                            "send {key} via {} timed out after {:?}",
                            target.channel.name(),
                            self.send_timeout
                        );
                        outcome.failures.push(format!("{key}: send timed out"));
                    }
                }
            }
        }

        outcome
    }
}
