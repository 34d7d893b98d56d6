//! Outbound Bot API calls.

use super::types::{TgResponse, TgUser};
use super::TelegramChannel;
use crate::utils::split_message;
use nudge_core::error::NudgeError;
use tracing::{debug, warn};

/// Telegram's per-message text limit.
const MAX_MESSAGE_LEN: usize = 4096;

impl TelegramChannel {
    /// Send plain text to a chat, split into as many messages as needed.
    ///
    /// Any non-2xx answer is an error so callers never treat it as delivered.
    pub async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), NudgeError> {
        let url = format!("{}/sendMessage", self.base_url);

        for chunk in split_message(text, MAX_MESSAGE_LEN) {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "disable_web_page_preview": true,
            });

            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| NudgeError::Channel(format!("telegram send failed: {e}")))?;

            let status = resp.status();
            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                warn!("telegram send to {chat_id} got {status}: {error_text}");
                return Err(NudgeError::Channel(format!(
                    "telegram send got {status}: {error_text}"
                )));
            }
        }

        debug!("telegram: sent {} bytes to {chat_id}", text.len());
        Ok(())
    }

    /// The bot's username (without `@`): configured value, else `getMe`.
    pub async fn bot_username(&self) -> Result<String, NudgeError> {
        let configured = self.config.bot_username.trim().trim_start_matches('@');
        if !configured.is_empty() {
            return Ok(configured.to_string());
        }

        let resp: TgResponse<TgUser> = self
            .client
            .get(format!("{}/getMe", self.base_url))
            .send()
            .await
            .map_err(|e| NudgeError::Channel(format!("telegram getMe failed: {e}")))?
            .json()
            .await
            .map_err(|e| NudgeError::Channel(format!("telegram getMe parse failed: {e}")))?;

        if !resp.ok {
            return Err(NudgeError::Channel(format!(
                "telegram getMe rejected: {}",
                resp.description.unwrap_or_default()
            )));
        }

        resp.result
            .and_then(|user| user.username)
            .ok_or_else(|| NudgeError::Channel("telegram getMe returned no username".into()))
    }
}
