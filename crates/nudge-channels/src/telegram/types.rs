//! Telegram Bot API deserialization types.
//!
//! Only the fields the webhook and `getMe` read; serde skips the rest.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TgResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// One webhook update. Only plain messages are of interest.
#[derive(Debug, Deserialize)]
pub struct TgUpdate {
    pub message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    pub text: Option<String>,
}

/// The bot itself, as returned by `getMe`.
#[derive(Debug, Deserialize)]
pub struct TgUser {
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
    pub id: i64,
}
