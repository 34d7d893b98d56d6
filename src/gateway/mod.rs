//! Gateway: wires the store, transports and drivers together.
//!
//! Runs the optional sweep loop and the HTTP API until ctrl-c, then stops
//! every background task and open session.

mod notifier;
mod poller;
mod sweep;


pub use notifier::{Notifier, Outcome, Target};
pub use poller::{PollContext, PollHandle, SessionRegistry};
pub use sweep::{sweep, SweepReport, MAX_REPORTED_ERRORS};

use crate::api::{self, ApiState};
use nudge_channels::browser::BrowserChannel;
use nudge_core::{clock::Clock, config::Config, traits::Channel};
use nudge_store::Store;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Long-poll wait for `GET /api/sessions/{user_id}/notifications`.
const LONG_POLL_SECS: u64 = 25;

/// Build the shared engine over one SQLite store.
pub fn build_notifier(store: Store, clock: Arc<dyn Clock>, send_timeout_secs: u64) -> Arc<Notifier> {
    let store = Arc::new(store);
    Arc::new(Notifier::new(
        store.clone(),
        store,
        clock,
        Duration::from_secs(send_timeout_secs),
    ))
}

pub struct Gateway {
    config: Config,
    notifier: Arc<Notifier>,
    telegram: Option<Arc<dyn Channel>>,
    bot_username: Option<String>,
    sessions: Arc<SessionRegistry>,
    uptime: Instant,
}

impl Gateway {
    pub fn new(
        config: Config,
        notifier: Arc<Notifier>,
        telegram: Option<Arc<dyn Channel>>,
        bot_username: Option<String>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(PollContext {
            notifier: notifier.clone(),
            browser: Arc::new(BrowserChannel::default()),
            telegram: telegram.clone(),
            interval: Duration::from_secs(config.poll.interval_secs.max(1)),
            window: config.poll.window_minutes,
        }));
        Self {
            config,
            notifier,
            telegram,
            bot_username,
            sessions,
            uptime: Instant::now(),
        }
    }

    fn api_state(&self) -> ApiState {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        ApiState {
            notifier: self.notifier.clone(),
            telegram: self.telegram.clone(),
            bot_username: self.bot_username.clone(),
            sessions: self.sessions.clone(),
            api_key: non_empty(&self.config.api.api_key),
            cron_secret: self.config.cron.secret.clone(),
            webhook_secret: self.config.telegram.webhook_secret.clone(),
            link_ttl: chrono::Duration::minutes(self.config.linking.ttl_minutes),
            sweep_window: self.config.sweep.window_minutes,
            long_poll: Duration::from_secs(LONG_POLL_SECS),
            uptime: self.uptime,
        }
    }

    /// Run until ctrl-c.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "{} gateway running | telegram: {} | sweep: {} | api: {}",
            self.config.nudge.name,
            if self.telegram.is_some() { "on" } else { "off" },
            if self.config.sweep.enabled { "on" } else { "off" },
            if self.config.api.enabled {
                format!("{}:{}", self.config.api.host, self.config.api.port)
            } else {
                "off".to_string()
            },
        );

        // Spawn sweep loop.
        let sweep_handle = match (self.config.sweep.enabled, &self.telegram) {
            (true, Some(telegram)) => {
                let notifier = self.notifier.clone();
                let telegram = Some(telegram.clone());
                let interval = self.config.sweep.interval_secs.max(1);
                let window = self.config.sweep.window_minutes;
                Some(tokio::spawn(async move {
                    Self::sweep_loop(notifier, telegram, interval, window).await;
                }))
            }
            (true, None) => {
                warn!("sweep is enabled but telegram is not configured; not sweeping");
                None
            }
            _ => None,
        };

        // Spawn HTTP API server.
        let api_handle = if self.config.api.enabled {
            let api_cfg = self.config.api.clone();
            let state = self.api_state();
            Some(tokio::spawn(async move {
                api::serve(api_cfg, state).await;
            }))
        } else {
            None
        };

        if tokio::signal::ctrl_c().await.is_err() {
            warn!("could not listen for ctrl-c; shutting down");
        } else {
            info!("Received shutdown signal");
        }

        self.shutdown(&sweep_handle, &api_handle);
        Ok(())
    }

    fn shutdown(
        &self,
        sweep_handle: &Option<tokio::task::JoinHandle<()>>,
        api_handle: &Option<tokio::task::JoinHandle<()>>,
    ) {
        info!("Shutting down...");

        if let Some(h) = sweep_handle {
            h.abort();
        }
        if let Some(h) = api_handle {
            h.abort();
        }
        self.sessions.close_all();

        info!("Shutdown complete.");
    }
}
