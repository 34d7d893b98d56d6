use serde::{Deserialize, Serialize};

/// A rendered notification addressed to one recipient on one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Channel-specific address (Telegram chat_id, or user id for browser sessions).
    pub recipient: String,
    /// Event key or test tag. Browser clients collapse notifications by tag.
    #[serde(default)]
    pub tag: String,
}

impl Notification {
    pub fn new(title: &str, body: &str, recipient: &str, tag: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            recipient: recipient.to_string(),
            tag: tag.to_string(),
        }
    }

    /// Single-message text form used by chat transports.
    pub fn text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}
