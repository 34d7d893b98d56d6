//! Telegram Bot API channel.
//!
//! Outbound only: reminders go out with `sendMessage`. Inbound `/start`
//! updates arrive through the HTTP webhook and are decoded with [`types`].
//! Docs: <https://core.telegram.org/bots/api>

mod send;
pub mod types;


use async_trait::async_trait;
use nudge_core::{
    config::TelegramConfig, error::NudgeError, event::ChannelKind, message::Notification,
    traits::Channel,
};

/// Telegram channel using the Bot API.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    base_url: String,
}

impl TelegramChannel {
    /// Create a new Telegram channel from config.
    pub fn new(config: TelegramConfig) -> Self {
        let base_url = format!("https://api.telegram.org/bot{}", config.bot_token);
        Self {
            config,
            client: reqwest::Client::new(),
            base_url,
        }
    }

    /// Point the channel at a different Bot API host.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Whether a bot token is configured at all.
    pub fn is_configured(&self) -> bool {
        self.config.enabled && !self.config.bot_token.trim().is_empty()
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, notification: &Notification) -> Result<(), NudgeError> {
        if notification.recipient.trim().is_empty() {
            return Err(NudgeError::Channel("telegram send: empty chat id".into()));
        }
        self.send_text(&notification.recipient, &notification.text())
            .await
    }
}
