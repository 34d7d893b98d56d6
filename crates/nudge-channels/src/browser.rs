//! In-process outbox for browser sessions.
//!
//! The web client long-polls for its pending notifications and shows them
//! with the system notification API. Sending only enqueues; a notification
//! counts as delivered once it is in the outbox.

use async_trait::async_trait;
use nudge_core::{
    error::NudgeError, event::ChannelKind, message::Notification, traits::Channel,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Pending notifications kept per user before the oldest are dropped.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 50;

pub struct BrowserChannel {
    queues: Mutex<HashMap<String, VecDeque<Notification>>>,
    notify: Notify,
    capacity: usize,
}

impl Default for BrowserChannel {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

impl BrowserChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        }
    }

    /// Take everything queued for `recipient`, oldest first.
    pub fn drain(&self, recipient: &str) -> Vec<Notification> {
        match self.queues.lock() {
            Ok(mut queues) => queues
                .remove(recipient)
                .map(Vec::from)
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        }
    }

    /// Drain, waiting up to `timeout` for something to arrive if the queue is empty.
    pub async fn wait(&self, recipient: &str, timeout: Duration) -> Vec<Notification> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // Registered before the check so a push in between is not missed.
            let notified = self.notify.notified();
            let pending = self.drain(recipient);
            if !pending.is_empty() {
                return pending;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }

    /// Number of queued notifications for `recipient`.
    pub fn pending(&self, recipient: &str) -> usize {
        self.queues
            .lock()
            .map(|q| q.get(recipient).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Forget a recipient's queue (session closed).
    pub fn discard(&self, recipient: &str) {
        if let Ok(mut queues) = self.queues.lock() {
            queues.remove(recipient);
        }
    }
}

#[async_trait]
impl Channel for BrowserChannel {
    fn name(&self) -> &str {
        "browser"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Browser
    }

    async fn send(&self, notification: &Notification) -> Result<(), NudgeError> {
        {
            let mut queues = self
                .queues
                .lock()
                .map_err(|_| NudgeError::Channel("browser outbox poisoned".into()))?;
            let queue = queues.entry(notification.recipient.clone()).or_default();
            if queue.len() >= self.capacity {
                warn!(
                    "browser outbox for {} full, dropping oldest",
                    notification.recipient
                );
                queue.pop_front();
            }
            queue.push_back(notification.clone());
        }
        self.notify.notify_waiters();
        debug!("browser: queued {} for {}", notification.tag, notification.recipient);
        Ok(())
    }
}
