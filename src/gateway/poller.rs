//! Client poll driver: one timer per open browser session.

use super::notifier::{Notifier, Outcome, Target};
use nudge_channels::browser::BrowserChannel;
use nudge_core::{settings, traits::Channel};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Everything a session tick needs, shared by all sessions.
#[derive(Clone)]
pub struct PollContext {
    pub notifier: Arc<Notifier>,
    pub browser: Arc<BrowserChannel>,
    pub telegram: Option<Arc<dyn Channel>>,
    pub interval: Duration,
    pub window: u32,
}

impl PollContext {
    /// One evaluation for one user. Never fails; problems are logged.
    pub async fn tick(&self, user_id: &str, browser_permission: bool) -> Outcome {
        let user_settings = match settings::resolve(self.notifier.store(), user_id).await {
            Ok(s) => s,
            Err(e) => {
                warn!("poll {user_id}: settings unavailable: {e}");
                return Outcome::default();
            }
        };
        if !user_settings.enabled {
            return Outcome::default();
        }

        let mut targets = Vec::new();
        if browser_permission {
            let browser: Arc<dyn Channel> = self.browser.clone();
            targets.push(Target::new(browser, user_id));
        }
        if let (Some(telegram), Some(chat)) = (&self.telegram, user_settings.telegram_chat()) {
            targets.push(Target::new(telegram.clone(), chat));
        }
        if targets.is_empty() {
            return Outcome::default();
        }

        let outcome = self
            .notifier
            .run_for_user(user_id, &user_settings, self.window, &targets)
            .await;
        if outcome.sent > 0 || !outcome.failures.is_empty() {
            debug!(
                "poll {user_id}: sent {}, failed {}",
                outcome.sent,
                outcome.failures.len()
            );
        }
        outcome
    }
}

/// A running session poller. Dropping it stops the timer.
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Start polling: once right away, then every `ctx.interval`.
    pub fn spawn(ctx: PollContext, user_id: String, browser_permission: bool) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(ctx.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // The first tick completes immediately.
                ticker.tick().await;
                ctx.tick(&user_id, browser_permission).await;
            }
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Open sessions by user id. At most one poller per user.
pub struct SessionRegistry {
    ctx: PollContext,
    sessions: Mutex<HashMap<String, PollHandle>>,
}

impl SessionRegistry {
    pub fn new(ctx: PollContext) -> Self {
        Self {
            ctx,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn browser(&self) -> &Arc<BrowserChannel> {
        &self.ctx.browser
    }

    /// Open or replace the user's session.
    pub fn open(&self, user_id: &str, browser_permission: bool) {
        let handle = PollHandle::spawn(self.ctx.clone(), user_id.to_string(), browser_permission);
        let previous = match self.sessions.lock() {
            Ok(mut sessions) => sessions.insert(user_id.to_string(), handle),
            Err(_) => {
                warn!("session registry poisoned; not opening {user_id}");
                return;
            }
        };
        if previous.is_some() {
            info!("session for {user_id} replaced");
        } else {
            info!("session for {user_id} opened");
        }
    }

    /// Stop the user's poller. Returns whether a session existed.
    pub fn close(&self, user_id: &str) -> bool {
        let removed = self
            .sessions
            .lock()
            .map(|mut sessions| sessions.remove(user_id))
            .unwrap_or(None);
        self.ctx.browser.discard(user_id);
        if removed.is_some() {
            info!("session for {user_id} closed");
        }
        removed.is_some()
    }

    pub fn close_all(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            let count = sessions.len();
            sessions.clear();
            if count > 0 {
                info!("closed {count} sessions");
            }
        }
    }

    pub fn is_open(&self, user_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|sessions| sessions.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
