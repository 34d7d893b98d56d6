use super::Store;
use chrono::{TimeZone, Utc};
use nudge_core::{
    config::StoreConfig,
    event::{derive_key, ChannelKind, DedupEvent, ReminderKind},
    records::{Collection, Row},
    traits::{DedupLedger, RowStore},
};

async fn test_store() -> Store {
    Store::in_memory().await.unwrap()
}

fn event(key: &str) -> DedupEvent {
    DedupEvent {
        event_key: key.to_string(),
        user_id: "u1".to_string(),
        channel: ChannelKind::Telegram,
        sent_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 1, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_append_and_find_by_column() {
    let store = test_store().await;
    store
        .append(
            Collection::Tasks,
            Row::new("t1").with("userId", "u1").with("title", "A"),
        )
        .await
        .unwrap();
    store
        .append(
            Collection::Tasks,
            Row::new("t2").with("userId", "u2").with("title", "B"),
        )
        .await
        .unwrap();
    store
        .append(
            Collection::Tasks,
            Row::new("t3").with("userId", "u1").with("title", "C"),
        )
        .await
        .unwrap();

    let rows = store.find(Collection::Tasks, "userId", "u1").await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t3"], "append order is preserved");
    assert_eq!(rows[1].get("title"), "C");
}

#[tokio::test]
async fn test_collections_are_separate() {
    let store = test_store().await;
    store
        .append(Collection::Habits, Row::new("x").with("userId", "u1"))
        .await
        .unwrap();
    assert!(store
        .find(Collection::Tasks, "userId", "u1")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(store.all(Collection::Habits).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_update_replaces_cells() {
    let store = test_store().await;
    store
        .append(
            Collection::NotificationSettings,
            Row::new("s1").with("userId", "u1").with("enabled", "false"),
        )
        .await
        .unwrap();

    let updated = Row::new("s1").with("userId", "u1").with("enabled", "true");
    assert!(store
        .update(Collection::NotificationSettings, updated)
        .await
        .unwrap());

    let rows = store.all(Collection::NotificationSettings).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("enabled"), "true");
}

#[tokio::test]
async fn test_update_missing_row_returns_false() {
    let store = test_store().await;
    let updated = store
        .update(Collection::Tasks, Row::new("nope").with("title", "x"))
        .await
        .unwrap();
    assert!(!updated);
}

#[tokio::test]
async fn test_ledger_has_sent_after_record() {
    let store = test_store().await;
    let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let key = derive_key(date, ReminderKind::HabitReminder, "u1", ChannelKind::Telegram);

    assert!(!store.has_sent(&key).await.unwrap());
    store.record_sent(&event(&key)).await.unwrap();
    assert!(store.has_sent(&key).await.unwrap());

    let other = derive_key(date, ReminderKind::HabitReminder, "u1", ChannelKind::Browser);
    assert!(!store.has_sent(&other).await.unwrap(), "channels are independent");
}

#[tokio::test]
async fn test_ledger_duplicate_record_is_noop() {
    let store = test_store().await;
    store.record_sent(&event("k")).await.unwrap();
    store.record_sent(&event("k")).await.unwrap();
    assert_eq!(store.event_count(None).await.unwrap(), 1);
    assert_eq!(store.event_count(Some("u1")).await.unwrap(), 1);
    assert_eq!(store.event_count(Some("u2")).await.unwrap(), 0);
}

#[tokio::test]
async fn test_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        db_path: dir
            .path()
            .join("data/nudge.db")
            .to_string_lossy()
            .into_owned(),
    };

    {
        let store = Store::new(&config).await.unwrap();
        store.record_sent(&event("persisted")).await.unwrap();
    }

    let store = Store::new(&config).await.unwrap();
    assert!(store.has_sent("persisted").await.unwrap());
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let store = test_store().await;
    Store::run_migrations(store.pool()).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}
