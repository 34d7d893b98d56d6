//! Sent-event ledger.

use super::Store;
use async_trait::async_trait;
use chrono::SecondsFormat;
use nudge_core::{error::NudgeError, event::DedupEvent, traits::DedupLedger};
use tracing::debug;
use uuid::Uuid;

#[async_trait]
impl DedupLedger for Store {
    async fn has_sent(&self, event_key: &str) -> Result<bool, NudgeError> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM notification_events WHERE event_key = ? LIMIT 1")
                .bind(event_key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| NudgeError::Store(format!("ledger lookup failed: {e}")))?;
        Ok(found.is_some())
    }

    async fn record_sent(&self, event: &DedupEvent) -> Result<(), NudgeError> {
        // A concurrent driver may have recorded the same key first.
        let result = sqlx::query(
            "INSERT OR IGNORE INTO notification_events (id, event_key, user_id, channel, sent_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&event.event_key)
        .bind(&event.user_id)
        .bind(event.channel.as_str())
        .bind(event.sent_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .execute(&self.pool)
        .await
        .map_err(|e| NudgeError::Store(format!("ledger insert failed: {e}")))?;

        if result.rows_affected() == 0 {
            debug!("ledger: {} already recorded", event.event_key);
        }
        Ok(())
    }
}

impl Store {
    /// Number of recorded sends, optionally for one user.
    pub async fn event_count(&self, user_id: Option<&str>) -> Result<i64, NudgeError> {
        let (count,): (i64,) = match user_id {
            Some(user) => {
                sqlx::query_as("SELECT COUNT(*) FROM notification_events WHERE user_id = ?")
                    .bind(user)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM notification_events")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| NudgeError::Store(format!("ledger count failed: {e}")))?;
        Ok(count)
    }
}
