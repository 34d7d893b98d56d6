use super::*;
use crate::gateway::{build_notifier, PollContext};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use nudge_channels::browser::BrowserChannel;
use nudge_core::{clock::FixedClock, error::NudgeError, event::ChannelKind, traits::RowStore};
use nudge_store::Store;
use std::sync::Mutex;
use tower::ServiceExt;

// -----------------------------------------------------------------------
// Mock Channel
// -----------------------------------------------------------------------

/// A mock Telegram channel that records sent messages for assertion.
struct MockChannel {
    sent: Mutex<Vec<Notification>>,
    /// When true, `send()` returns an error (simulates delivery failure).
    fail_send: bool,
}

impl MockChannel {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_send: false,
        })
    }

    fn new_failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_send: true,
        })
    }

    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn send(&self, notification: &Notification) -> Result<(), NudgeError> {
        if self.fail_send {
            return Err(NudgeError::Channel("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------

struct Harness {
    state: ApiState,
    store: Store,
}

impl Harness {
    fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// State over an in-memory store, clock pinned to 2026-03-01 09:01 UTC.
async fn harness(telegram: Option<Arc<MockChannel>>) -> Harness {
    let store = Store::in_memory().await.unwrap();
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 1, 0).unwrap();
    let notifier = build_notifier(store.clone(), Arc::new(FixedClock(now)), 1);
    let telegram: Option<Arc<dyn Channel>> = telegram.map(|t| t as Arc<dyn Channel>);
    let sessions = Arc::new(SessionRegistry::new(PollContext {
        notifier: notifier.clone(),
        browser: Arc::new(BrowserChannel::default()),
        telegram: telegram.clone(),
        interval: Duration::from_secs(3600),
        window: 2,
    }));
    let state = ApiState {
        notifier,
        bot_username: telegram.as_ref().map(|_| "nudge_bot".to_string()),
        telegram,
        sessions,
        api_key: None,
        cron_secret: "cron-s3cret".to_string(),
        webhook_secret: String::new(),
        link_ttl: chrono::Duration::minutes(30),
        sweep_window: 5,
        long_poll: Duration::from_millis(500),
        uptime: Instant::now(),
    };
    Harness { state, store }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn start_update(text: &str) -> Value {
    json!({
        "update_id": 1,
        "message": {
            "message_id": 10,
            "from": {"id": 555, "first_name": "Ada"},
            "chat": {"id": 555, "type": "private"},
            "text": text,
        }
    })
}

/// Parse response body as JSON.
async fn body_json(resp: axum::http::Response<Body>) -> Value {
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn enable_linked(store: &Store, user: &str, chat: &str) {
    settings::update(
        store,
        user,
        SettingsUpdate {
            enabled: Some(true),
            telegram_enabled: Some(true),
            telegram_chat_id: Some(chat.to_string()),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
}

// -----------------------------------------------------------------------
// Health + auth
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_health_no_auth() {
    let h = harness(None).await;
    let req = Request::get("/api/health").body(Body::empty()).unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["telegram"], "not_configured");
    assert_eq!(json["sessions"], 0);
}

#[tokio::test]
async fn test_health_valid_auth() {
    let mut h = harness(Some(MockChannel::new())).await;
    h.state.api_key = Some("secret".to_string());
    let req = Request::get("/api/health")
        .header("Authorization", "Bearer secret")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["telegram"], "configured");
}

#[tokio::test]
async fn test_health_bad_auth() {
    let mut h = harness(None).await;
    h.state.api_key = Some("secret".to_string());
    let req = Request::get("/api/health")
        .header("Authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_missing_auth() {
    let mut h = harness(None).await;
    h.state.api_key = Some("secret".to_string());
    let req = Request::get("/api/health").body(Body::empty()).unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

// -----------------------------------------------------------------------
// Settings
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_get_settings_defaults_for_new_user() {
    let h = harness(None).await;
    let req = Request::get("/api/notification-settings?userId=u1")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    assert_eq!(json["enabled"], false);
    assert_eq!(json["habitReminderTime"], "09:00");
    assert_eq!(json["taskReminderMinutes"], 15);
    assert_eq!(json["timezone"], "UTC");
}

#[tokio::test]
async fn test_get_settings_requires_user() {
    let h = harness(None).await;
    let req = Request::get("/api/notification-settings")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_put_settings_merges() {
    let h = harness(None).await;
    let app = h.router();

    let req = json_request(
        "PUT",
        "/api/notification-settings?userId=u1",
        &json!({"enabled": true, "goalReminderTime": "7:30"}),
    );
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["goalReminderTime"], "07:30");

    let req = json_request(
        "PUT",
        "/api/notification-settings?userId=u1",
        &json!({"habitReminderTime": "25:00", "timezone": "Europe/Berlin"}),
    );
    let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(json["enabled"], true, "unspecified fields are kept");
    assert_eq!(json["goalReminderTime"], "07:30");
    assert_eq!(json["habitReminderTime"], "09:00", "malformed time ignored");
    assert_eq!(json["timezone"], "Europe/Berlin");

    let req = Request::get("/api/notification-settings?userId=u1")
        .body(Body::empty())
        .unwrap();
    let json = body_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(json["timezone"], "Europe/Berlin");
    assert_eq!(
        h.store
            .all(nudge_core::records::Collection::NotificationSettings)
            .await
            .unwrap()
            .len(),
        1,
        "second write updates the same row"
    );
}

#[tokio::test]
async fn test_put_settings_invalid_json() {
    let h = harness(None).await;
    let req = Request::put("/api/notification-settings?userId=u1")
        .header("Content-Type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// -----------------------------------------------------------------------
// Telegram linking
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_connect_without_telegram() {
    let h = harness(None).await;
    let req = json_request(
        "POST",
        "/api/notifications/telegram/connect",
        &json!({"userId": "u1"}),
    );
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_connect_then_start_links_chat() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    let app = h.router();

    let req = json_request(
        "POST",
        "/api/notifications/telegram/connect",
        &json!({"userId": "u1"}),
    );
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["botUsername"], "@nudge_bot");
    assert_eq!(json["expiresAt"], "2026-03-01T09:31:00.000Z");
    let deep_link = json["deepLink"].as_str().unwrap();
    let token = deep_link
        .strip_prefix("https://t.me/nudge_bot?start=")
        .unwrap()
        .to_string();
    assert!(json["appDeepLink"]
        .as_str()
        .unwrap()
        .ends_with(&format!("start={token}")));

    let req = json_request(
        "POST",
        "/api/telegram/webhook",
        &start_update(&format!("/start {token}")),
    );
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["ok"], true);

    let linked = settings::resolve(&h.store, "u1").await.unwrap();
    assert!(linked.enabled);
    assert_eq!(linked.telegram_chat(), Some("555"));

    let replies = telegram.sent();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].recipient, "555");
    assert!(replies[0].title.contains("connected"));
}

#[tokio::test]
async fn test_webhook_bare_start_welcomes() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    let req = json_request("POST", "/api/telegram/webhook", &start_update("/start"));
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(telegram.sent()[0].title.contains("Welcome"));
}

#[tokio::test]
async fn test_webhook_ignores_other_messages() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    let req = json_request("POST", "/api/telegram/webhook", &start_update("hello"));
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(telegram.sent().is_empty());
}

#[tokio::test]
async fn test_webhook_secret_mismatch() {
    let mut h = harness(Some(MockChannel::new())).await;
    h.state.webhook_secret = "hook".to_string();

    let mut req = json_request("POST", "/api/telegram/webhook", &start_update("/start"));
    req.headers_mut()
        .insert("x-telegram-bot-api-secret-token", "nope".parse().unwrap());
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let mut req = json_request("POST", "/api/telegram/webhook", &start_update("/start"));
    req.headers_mut()
        .insert("x-telegram-bot-api-secret-token", "hook".parse().unwrap());
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// -----------------------------------------------------------------------
// Telegram proxy send
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_telegram_send_requires_fields() {
    let h = harness(Some(MockChannel::new())).await;
    let req = json_request(
        "POST",
        "/api/notifications/telegram",
        &json!({"chatId": "1", "title": "  ", "body": "b"}),
    );
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_telegram_send_delivers() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    let req = json_request(
        "POST",
        "/api/notifications/telegram",
        &json!({"chatId": "42", "title": "Hi", "body": "there"}),
    );
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["success"], true);
    assert_eq!(telegram.sent()[0].text(), "Hi\nthere");
}

#[tokio::test]
async fn test_telegram_send_failure_is_bad_gateway() {
    let h = harness(Some(MockChannel::new_failing())).await;
    let req = json_request(
        "POST",
        "/api/notifications/telegram",
        &json!({"chatId": "42", "title": "Hi", "body": "there"}),
    );
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert!(json["details"]
        .as_str()
        .unwrap()
        .contains("connection reset"));
}

// -----------------------------------------------------------------------
// Cron trigger
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_cron_secret_not_configured() {
    let mut h = harness(Some(MockChannel::new())).await;
    h.state.cron_secret = String::new();
    let req = Request::post("/api/cron/notifications")
        .header("Authorization", "Bearer anything")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body_json(resp).await["error"],
        "cron secret is not configured"
    );
}

#[tokio::test]
async fn test_cron_bad_secret_sends_nothing() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    enable_linked(&h.store, "u1", "100").await;

    let req = Request::post("/api/cron/notifications")
        .header("Authorization", "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(telegram.sent().is_empty());
}

#[tokio::test]
async fn test_cron_runs_sweep_once_per_window() {
    let telegram = MockChannel::new();
    let h = harness(Some(telegram.clone())).await;
    enable_linked(&h.store, "u1", "100").await;
    let app = h.router();

    let trigger = || {
        Request::post("/api/cron/notifications")
            .header("Authorization", "Bearer cron-s3cret")
            .body(Body::empty())
            .unwrap()
    };

    let json = body_json(app.clone().oneshot(trigger()).await.unwrap()).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["checkedUsers"], 1);
    assert_eq!(json["sentCount"], 1);
    assert_eq!(json["errorsCount"], 0);

    let json = body_json(app.oneshot(trigger()).await.unwrap()).await;
    assert_eq!(json["sentCount"], 0, "second trigger in the window is deduplicated");
    assert_eq!(telegram.sent().len(), 1);
}

// -----------------------------------------------------------------------
// Sessions
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_session_lifecycle() {
    let h = harness(None).await;
    settings::update(
        &h.store,
        "u1",
        SettingsUpdate {
            enabled: Some(true),
            ..Default::default()
        },
        Utc::now(),
    )
    .await
    .unwrap();
    let app = h.router();

    let req = json_request(
        "POST",
        "/api/sessions",
        &json!({"userId": "u1", "browserPermission": true}),
    );
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::get("/api/sessions/u1/notifications")
        .body(Body::empty())
        .unwrap();
    let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
    let notes = json["notifications"].as_array().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["tag"], "2026-03-01|habit-reminder|u1|browser");

    let req = Request::post("/api/sessions/u1/test")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        app.clone().oneshot(req).await.unwrap().status(),
        StatusCode::OK
    );
    let req = Request::get("/api/sessions/u1/notifications")
        .body(Body::empty())
        .unwrap();
    let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(json["notifications"][0]["title"], "🔔 Test notification");

    let req = Request::delete("/api/sessions/u1")
        .body(Body::empty())
        .unwrap();
    let json = body_json(app.clone().oneshot(req).await.unwrap()).await;
    assert_eq!(json["closed"], true);

    let req = Request::get("/api/sessions/u1/notifications")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_requires_user() {
    let h = harness(None).await;
    let req = json_request("POST", "/api/sessions", &json!({"userId": " "}));
    let resp = h.router().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
