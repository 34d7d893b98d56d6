//! Telegram link handshake.
//!
//! The app hands the user a one-time deep link carrying a random token. When
//! the user presses Start, Telegram delivers `/start <token>` to the webhook
//! and the token's chat becomes the user's reminder destination.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use nudge_core::{
    error::NudgeError,
    records::{Collection, Row},
    settings,
    traits::RowStore,
};
use rand::RngCore;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

const TOKEN_BYTES: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Pending,
    Used,
    Expired,
}

impl TokenStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Used => "used",
            Self::Expired => "expired",
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "used" => Self::Used,
            "expired" => Self::Expired,
            _ => Self::Pending,
        }
    }
}

/// One row of `TelegramLinkTokens`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkToken {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub status: TokenStatus,
    pub chat_id: String,
    pub created_at: String,
    /// RFC 3339. Empty or unparsable means the token never expires.
    pub expires_at: String,
    pub used_at: String,
}

impl LinkToken {
    fn from_row(row: &Row) -> Self {
        Self {
            id: row.id.clone(),
            user_id: row.get("userId").trim().to_string(),
            token: row.get("token").trim().to_string(),
            status: TokenStatus::parse(row.get("status")),
            chat_id: row.get("chatId").to_string(),
            created_at: row.get("createdAt").to_string(),
            expires_at: row.get("expiresAt").to_string(),
            used_at: row.get("usedAt").to_string(),
        }
    }

    fn to_row(&self) -> Row {
        Row::new(&self.id)
            .with("userId", self.user_id.as_str())
            .with("token", self.token.as_str())
            .with("status", self.status.as_str())
            .with("chatId", self.chat_id.as_str())
            .with("createdAt", self.created_at.as_str())
            .with("expiresAt", self.expires_at.as_str())
            .with("usedAt", self.used_at.as_str())
    }

    fn is_used(&self) -> bool {
        self.status == TokenStatus::Used || !self.used_at.trim().is_empty()
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        DateTime::parse_from_rfc3339(self.expires_at.trim())
            .map(|at| at.with_timezone(&Utc) <= now)
            .unwrap_or(false)
    }

    /// Can still be handed out by `connect`.
    fn is_reusable(&self, now: DateTime<Utc>) -> bool {
        !self.token.is_empty()
            && !self.is_used()
            && self.status != TokenStatus::Expired
            && !self.is_expired(now)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Fresh URL-safe token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Links shown to the user for one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepLinks {
    pub deep_link: String,
    pub app_deep_link: String,
    pub bot_username: String,
}

pub fn deep_links(bot: &str, token: &str) -> DeepLinks {
    let bot = bot.trim().trim_start_matches('@');
    let token = urlencoding::encode(token);
    DeepLinks {
        deep_link: format!("https://t.me/{bot}?start={token}"),
        app_deep_link: format!(
            "tg://resolve?domain={}&start={token}",
            urlencoding::encode(bot)
        ),
        bot_username: format!("@{bot}"),
    }
}

/// The user's pending token, or a new one valid for `ttl`.
pub async fn connect(
    store: &dyn RowStore,
    user_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<LinkToken, NudgeError> {
    let existing = store
        .find(Collection::TelegramLinkTokens, "userId", user_id)
        .await?;
    if let Some(active) = existing
        .iter()
        .map(LinkToken::from_row)
        .find(|t| t.is_reusable(now))
    {
        return Ok(active);
    }

    let token = LinkToken {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        token: generate_token(),
        status: TokenStatus::Pending,
        chat_id: String::new(),
        created_at: timestamp(now),
        expires_at: timestamp(now + ttl),
        used_at: String::new(),
    };
    store
        .append(Collection::TelegramLinkTokens, token.to_row())
        .await?;
    info!("created telegram link token for user {user_id}");
    Ok(token)
}

/// A `/start` command, as typed or as sent by a deep link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartCommand {
    Bare,
    Token(String),
}

/// Recognize `/start`, `/start@bot` and either followed by a token.
pub fn parse_start(text: &str) -> Option<StartCommand> {
    let trimmed = text.trim();
    let head = trimmed.get(..6)?;
    if !head.eq_ignore_ascii_case("/start") {
        return None;
    }
    let rest = &trimmed[6..];
    let rest = match rest.strip_prefix('@') {
        Some(mention) => {
            let end = mention
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(mention.len());
            if end == 0 {
                return None;
            }
            &mention[end..]
        }
        None => rest,
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    match rest.trim() {
        "" => Some(StartCommand::Bare),
        token => Some(StartCommand::Token(token.to_string())),
    }
}

/// What happened to a `/start` and what to answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Welcome,
    AlreadyUsed,
    Expired,
    Linked { user_id: String },
}

impl LinkOutcome {
    /// Reply as (first line, rest).
    pub fn reply(&self) -> (&'static str, &'static str) {
        match self {
            Self::Welcome => (
                "👋 Welcome to Nudge!",
                "This bot sends reminders for your habits, tasks and goals, plus a daily summary.\n\
                 To connect it to your account, open the app and press \"Connect Telegram\" \
                 in the notification settings.",
            ),
            Self::AlreadyUsed => (
                "This link has already been used.",
                "Create a new link in the app.",
            ),
            Self::Expired => ("This link has expired.", "Create a new link in the app."),
            Self::Linked { .. } => (
                "✅ Telegram is connected to Nudge.",
                "You will get habit, task and goal reminders here, plus a daily summary.\n\
                 Set reminder times under Notifications in the app.",
            ),
        }
    }
}

/// Redeem a link token for `chat_id`.
pub async fn redeem(
    store: &dyn RowStore,
    token: &str,
    chat_id: &str,
    now: DateTime<Utc>,
) -> Result<LinkOutcome, NudgeError> {
    let Some(row) = store
        .find(Collection::TelegramLinkTokens, "token", token)
        .await?
        .into_iter()
        .next()
    else {
        return Ok(LinkOutcome::Welcome);
    };
    let mut link = LinkToken::from_row(&row);

    if link.user_id.is_empty() || link.is_used() {
        return Ok(LinkOutcome::AlreadyUsed);
    }

    if link.is_expired(now) {
        link.status = TokenStatus::Expired;
        store
            .update(Collection::TelegramLinkTokens, link.to_row())
            .await?;
        return Ok(LinkOutcome::Expired);
    }

    settings::link_telegram(store, &link.user_id, chat_id, now).await?;

    link.status = TokenStatus::Used;
    link.chat_id = chat_id.to_string();
    link.used_at = timestamp(now);
    store
        .update(Collection::TelegramLinkTokens, link.to_row())
        .await?;

    Ok(LinkOutcome::Linked {
        user_id: link.user_id,
    })
}
