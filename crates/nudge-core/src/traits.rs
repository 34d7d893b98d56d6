use crate::{
    error::NudgeError,
    event::{ChannelKind, DedupEvent},
    message::Notification,
    records::{Collection, Row},
};
use async_trait::async_trait;

/// Notification transport.
///
/// Every delivery path (Telegram, browser sessions) implements this trait so
/// the reminder engine can dispatch without knowing the wire protocol.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Which ledger channel sends through this transport are recorded under.
    fn kind(&self) -> ChannelKind;

    /// Deliver one notification. `Ok` means the transport accepted it.
    async fn send(&self, notification: &Notification) -> Result<(), NudgeError>;
}

/// Key-indexed row store holding the spreadsheet collections.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Rows whose `column` cell equals `value`, in append order.
    async fn find(
        &self,
        collection: Collection,
        column: &str,
        value: &str,
    ) -> Result<Vec<Row>, NudgeError>;

    /// Every row of a collection, in append order.
    async fn all(&self, collection: Collection) -> Result<Vec<Row>, NudgeError>;

    /// Append a new row.
    async fn append(&self, collection: Collection, row: Row) -> Result<(), NudgeError>;

    /// Replace the row with the same id. Returns `false` if no such row exists.
    async fn update(&self, collection: Collection, row: Row) -> Result<bool, NudgeError>;
}

/// Append-only record of sent reminder occurrences.
///
/// Not transactional: check as late as possible before sending, record right
/// after the transport accepts.
#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn has_sent(&self, event_key: &str) -> Result<bool, NudgeError>;

    /// Record a send. Recording a key that already exists is a no-op.
    async fn record_sent(&self, event: &DedupEvent) -> Result<(), NudgeError>;
}
