use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{IngestError, Result};
use crate::types::{BatchStatus, IngestionBatch};

/// Owns the `ingestion_batches` table, a separate connection onto L1's
/// SQLite file in the per-manager-connection convention.
pub struct BatchStore {
    db: Mutex<Connection>,
}

impl BatchStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    #[instrument(skip(self, channels))]
    pub fn create_batch(
        &self,
        start_message_id: i64,
        end_message_id: i64,
        channels: &[String],
        created_at: &str,
    ) -> Result<IngestionBatch> {
        let db = self.db.lock().unwrap();
        let channels_json = serde_json::to_string(channels).unwrap_or_else(|_| "[]".to_string());
        db.execute(
            "INSERT INTO ingestion_batches
             (start_message_id, end_message_id, channels, created_at, status)
             VALUES (?1, ?2, ?3, ?4, 'pending')",
            params![start_message_id, end_message_id, channels_json, created_at],
        )?;
        let id = db.last_insert_rowid();
        Ok(IngestionBatch {
            id,
            start_message_id,
            end_message_id,
            channels: channels.to_vec(),
            created_at: created_at.to_string(),
            status: BatchStatus::Pending,
        })
    }

    #[instrument(skip(self))]
    pub fn mark_status(&self, id: i64, status: BatchStatus) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE ingestion_batches SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        if n == 0 {
            return Err(IngestError::BatchNotFound { id });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<IngestionBatch> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, start_message_id, end_message_id, channels, created_at, status
             FROM ingestion_batches WHERE id = ?1",
            params![id],
            row_to_batch,
        )
        .optional()?
        .ok_or(IngestError::BatchNotFound { id })
    }
}

fn row_to_batch(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestionBatch> {
    let channels_json: String = row.get(3)?;
    let channels: Vec<String> = serde_json::from_str(&channels_json).unwrap_or_default();
    let status_str: String = row.get(5)?;
    let status = status_str.parse().unwrap_or(BatchStatus::Pending);
    Ok(IngestionBatch {
        id: row.get(0)?,
        start_message_id: row.get(1)?,
        end_message_id: row.get(2)?,
        channels,
        created_at: row.get(4)?,
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> BatchStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        BatchStore::new(conn)
    }

    #[test]
    fn create_then_mark_succeeded() {
        let store = store();
        let batch = store
            .create_batch(1, 10, &["c1".to_string()], "2026-01-01T00:00:00Z")
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);
        store.mark_status(batch.id, BatchStatus::Succeeded).unwrap();
        let reloaded = store.get(batch.id).unwrap();
        assert_eq!(reloaded.status, BatchStatus::Succeeded);
    }

    #[test]
    fn mark_status_on_unknown_batch_fails() {
        let store = store();
        let err = store.mark_status(999, BatchStatus::Failed).unwrap_err();
        assert!(matches!(err, IngestError::BatchNotFound { id: 999 }));
    }
}
