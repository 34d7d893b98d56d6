//! Row collections stored as JSON cell maps.

use super::Store;
use async_trait::async_trait;
use nudge_core::{
    error::NudgeError,
    records::{Collection, Row},
    traits::RowStore,
};
use std::collections::BTreeMap;

fn decode(id: String, data: &str) -> Result<Row, NudgeError> {
    let cells: BTreeMap<String, String> = serde_json::from_str(data)?;
    Ok(Row { id, cells })
}

fn decode_all(rows: Vec<(String, String)>) -> Result<Vec<Row>, NudgeError> {
    rows.into_iter()
        .map(|(id, data)| decode(id, &data))
        .collect()
}

#[async_trait]
impl RowStore for Store {
    async fn find(
        &self,
        collection: Collection,
        column: &str,
        value: &str,
    ) -> Result<Vec<Row>, NudgeError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, data FROM rows \
             WHERE collection = ? AND json_extract(data, '$.\"' || ? || '\"') = ? \
             ORDER BY rowid",
        )
        .bind(collection.as_str())
        .bind(column)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| NudgeError::Store(format!("find in {} failed: {e}", collection.as_str())))?;

        decode_all(rows)
    }

    async fn all(&self, collection: Collection) -> Result<Vec<Row>, NudgeError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, data FROM rows WHERE collection = ? ORDER BY rowid")
                .bind(collection.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    NudgeError::Store(format!("list {} failed: {e}", collection.as_str()))
                })?;

        decode_all(rows)
    }

    async fn append(&self, collection: Collection, row: Row) -> Result<(), NudgeError> {
        let data = serde_json::to_string(&row.cells)?;
        sqlx::query("INSERT INTO rows (collection, id, data) VALUES (?, ?, ?)")
            .bind(collection.as_str())
            .bind(&row.id)
            .bind(&data)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                NudgeError::Store(format!("append to {} failed: {e}", collection.as_str()))
            })?;
        Ok(())
    }

    async fn update(&self, collection: Collection, row: Row) -> Result<bool, NudgeError> {
        let data = serde_json::to_string(&row.cells)?;
        let result = sqlx::query(
            "UPDATE rows SET data = ?, updated_at = datetime('now') \
             WHERE collection = ? AND id = ?",
        )
        .bind(&data)
        .bind(collection.as_str())
        .bind(&row.id)
        .execute(&self.pool)
        .await
        .map_err(|e| NudgeError::Store(format!("update in {} failed: {e}", collection.as_str())))?;

        Ok(result.rows_affected() > 0)
    }
}
