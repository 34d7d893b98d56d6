//! HTTP API server for the web app, the external cron trigger and the
//! Telegram webhook.
//!
//! Spawned as a background task in the gateway, same pattern as the sweep loop.

use crate::gateway::{sweep, Notifier, SessionRegistry};
use crate::linking::{self, LinkOutcome, StartCommand};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use nudge_channels::telegram::types::TgUpdate;
use nudge_core::{
    config::ApiConfig,
    message::Notification,
    settings::{self, SettingsUpdate},
    traits::Channel,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub notifier: Arc<Notifier>,
    pub telegram: Option<Arc<dyn Channel>>,
    /// Without `@`. `None` when Telegram is off or `getMe` failed.
    pub bot_username: Option<String>,
    pub sessions: Arc<SessionRegistry>,
    pub api_key: Option<String>,
    pub cron_secret: String,
    pub webhook_secret: String,
    pub link_ttl: chrono::Duration,
    pub sweep_window: u32,
    /// How long a notifications long-poll waits for something to arrive.
    pub long_poll: Duration,
    pub uptime: Instant,
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TelegramSendRequest {
    chat_id: Option<String>,
    title: Option<String>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenSessionRequest {
    user_id: String,
    #[serde(default)]
    browser_permission: bool,
}

fn bad_request(msg: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({"error": msg.into()})))
}

fn internal(msg: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": msg.into()})),
    )
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(v)| v)
        .map_err(|e| bad_request(format!("invalid request: {e}")))
}

fn required_user(query: UserQuery) -> Result<String, ApiError> {
    query
        .user_id
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| bad_request("userId is required"))
}

/// Constant-time string comparison to prevent timing attacks on token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth. Returns `None` if authorized, `Some(response)` if rejected.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Option<ApiError> {
    let key = match api_key {
        Some(k) => k,
        None => return None, // No auth configured: allow all.
    };

    let header = match headers.get("authorization") {
        Some(h) => h,
        None => {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "missing Authorization header"})),
            ));
        }
    };

    let value = match header.to_str() {
        Ok(v) => v,
        Err(_) => {
            return Some((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "invalid Authorization header"})),
            ));
        }
    };

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => None,
        _ => Some((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid token"})),
        )),
    }
}

/// `GET /api/health`: uptime, Telegram state and open sessions.
async fn health(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }

    let telegram = if state.telegram.is_some() {
        "configured"
    } else {
        "not_configured"
    };

    Ok(Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "telegram": telegram,
        "sessions": state.sessions.len(),
    })))
}

/// `GET /api/notification-settings?userId=`: resolved settings, defaults on failure.
async fn get_settings(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let user_id = required_user(query)?;

    let resolved = settings::resolve(state.notifier.store(), &user_id)
        .await
        .unwrap_or_else(|e| {
            warn!("settings for {user_id} unreadable, serving defaults: {e}");
            Default::default()
        });
    Ok(Json(json!(resolved)))
}

/// `PUT /api/notification-settings?userId=`: merge a partial update.
async fn put_settings(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Query(query): Query<UserQuery>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let user_id = required_user(query)?;
    let update = parse_body(body)?;

    let merged = settings::update(
        state.notifier.store(),
        &user_id,
        update,
        state.notifier.now(),
    )
    .await
    .map_err(|e| {
        error!("settings update for {user_id} failed: {e}");
        internal(format!("failed to save settings: {e}"))
    })?;
    Ok(Json(json!(merged)))
}

/// `POST /api/notifications/telegram/connect`: hand out a link token.
async fn telegram_connect(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let request = parse_body(body)?;
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(bad_request("userId is required"));
    }

    let bot = state
        .bot_username
        .as_deref()
        .ok_or_else(|| internal("telegram bot is not configured"))?;

    let token = linking::connect(
        state.notifier.store(),
        user_id,
        state.notifier.now(),
        state.link_ttl,
    )
    .await
    .map_err(|e| {
        error!("telegram connect for {user_id} failed: {e}");
        internal(format!("failed to create telegram link: {e}"))
    })?;

    let links = linking::deep_links(bot, &token.token);
    Ok(Json(json!({
        "success": true,
        "deepLink": links.deep_link,
        "appDeepLink": links.app_deep_link,
        "botUsername": links.bot_username,
        "expiresAt": token.expires_at,
    })))
}

/// `POST /api/notifications/telegram`: send one message straight through. Not deduplicated.
async fn telegram_send(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<TelegramSendRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let request = parse_body(body)?;

    let field = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or("").to_string();
    let (chat_id, title, text) = (
        field(&request.chat_id),
        field(&request.title),
        field(&request.body),
    );
    if chat_id.is_empty() || title.is_empty() || text.is_empty() {
        return Err(bad_request("chatId, title and body are required"));
    }

    let telegram = state
        .telegram
        .as_ref()
        .ok_or_else(|| internal("telegram is not configured"))?;

    let tag = format!("manual-{}", Uuid::new_v4());
    telegram
        .send(&Notification::new(&title, &text, &chat_id, &tag))
        .await
        .map_err(|e| {
            warn!("telegram proxy send to {chat_id} failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "failed to send telegram message",
                    "details": e.to_string(),
                })),
            )
        })?;

    Ok(Json(json!({"success": true})))
}

/// `POST /api/telegram/webhook`: `/start` handling for the link handshake.
///
/// Always 200 once authenticated so Telegram does not redeliver.
async fn telegram_webhook(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<TgUpdate>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if !state.webhook_secret.is_empty() {
        let incoming = headers
            .get("x-telegram-bot-api-secret-token")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !constant_time_eq(incoming, &state.webhook_secret) {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "Unauthorized"})),
            ));
        }
    }

    let ack = Json(json!({"ok": true}));
    let Ok(Json(update)) = body else {
        return Ok(ack);
    };
    let Some(message) = update.message else {
        return Ok(ack);
    };
    let chat_id = message.chat.id.to_string();
    let Some(command) = message.text.as_deref().and_then(linking::parse_start) else {
        return Ok(ack);
    };

    let outcome = match command {
        StartCommand::Bare => LinkOutcome::Welcome,
        StartCommand::Token(token) => {
            match linking::redeem(
                state.notifier.store(),
                &token,
                &chat_id,
                state.notifier.now(),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("telegram link redeem failed: {e}");
                    return Ok(ack);
                }
            }
        }
    };

    if let LinkOutcome::Linked { user_id } = &outcome {
        info!("telegram chat {chat_id} linked to {user_id}");
    }

    if let Some(telegram) = &state.telegram {
        let (title, text) = outcome.reply();
        if let Err(e) = telegram
            .send(&Notification::new(title, text, &chat_id, "link"))
            .await
        {
            warn!("telegram link reply to {chat_id} failed: {e}");
        }
    }

    Ok(ack)
}

/// `POST /api/cron/notifications`: external sweep trigger.
async fn cron_notifications(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    if state.cron_secret.is_empty() {
        return Err(internal("cron secret is not configured"));
    }
    if let Some(err) = check_auth(&headers, &Some(state.cron_secret.clone())) {
        return Err(err);
    }

    let report = sweep(&state.notifier, state.telegram.as_ref(), state.sweep_window)
        .await
        .map_err(|e| {
            error!("cron sweep failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"success": false, "error": e.to_string()})),
            )
        })?;
    Ok(Json(json!(report)))
}

/// `POST /api/sessions`: open (or replace) a browser session poller.
async fn open_session(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<OpenSessionRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let request = parse_body(body)?;
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(bad_request("userId is required"));
    }

    state.sessions.open(user_id, request.browser_permission);
    Ok(Json(json!({"success": true})))
}

fn session_not_found(user_id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("no open session for {user_id}")})),
    )
}

/// `GET /api/sessions/{user_id}/notifications`: long-poll the browser outbox.
async fn session_notifications(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    if !state.sessions.is_open(&user_id) {
        return Err(session_not_found(&user_id));
    }

    let notifications = state
        .sessions
        .browser()
        .wait(&user_id, state.long_poll)
        .await;
    Ok(Json(json!({"notifications": notifications})))
}

/// `DELETE /api/sessions/{user_id}`: stop the poller.
async fn close_session(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    let closed = state.sessions.close(&user_id);
    Ok(Json(json!({"success": true, "closed": closed})))
}

/// `POST /api/sessions/{user_id}/test`: undeduplicated test notification.
async fn session_test(
    headers: HeaderMap,
    State(state): State<ApiState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if let Some(err) = check_auth(&headers, &state.api_key) {
        return Err(err);
    }
    if !state.sessions.is_open(&user_id) {
        return Err(session_not_found(&user_id));
    }

    let tag = format!("test-{}", Uuid::new_v4());
    state
        .sessions
        .browser()
        .send(&Notification::new(
            "🔔 Test notification",
            "Browser notifications are working.",
            &user_id,
            &tag,
        ))
        .await
        .map_err(|e| internal(format!("test notification failed: {e}")))?;
    Ok(Json(json!({"success": true})))
}

/// Build the axum router with shared state.
pub(crate) fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/notification-settings",
            get(get_settings).put(put_settings),
        )
        .route("/api/notifications/telegram", post(telegram_send))
        .route(
            "/api/notifications/telegram/connect",
            post(telegram_connect),
        )
        .route("/api/telegram/webhook", post(telegram_webhook))
        .route("/api/cron/notifications", post(cron_notifications))
        .route("/api/sessions", post(open_session))
        .route(
            "/api/sessions/{user_id}",
            axum::routing::delete(close_session),
        )
        .route(
            "/api/sessions/{user_id}/notifications",
            get(session_notifications),
        )
        .route("/api/sessions/{user_id}/test", post(session_test))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the API server. Called from `Gateway::run()`.
pub async fn serve(config: ApiConfig, state: ApiState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("API server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("API server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("API server error: {e}");
    }
}

#[cfg(test)]
mod tests;
