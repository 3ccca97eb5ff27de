use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{CaptureError, Result};
use crate::types::{AuthorRole, Message};

/// Thread-safe manager for the append-only raw capture log (L1).
///
/// Wraps a single SQLite connection in a `Mutex` — SQLite itself serializes
/// writers, the `Mutex` just keeps the borrow checker honest across threads.
pub struct CaptureStore {
    db: Mutex<Connection>,
}

impl CaptureStore {
    /// Wrap an already-open (and `db::init_db`-initialised) connection.
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Append a message and return its assigned id. Never fails for content
    /// shape — only a backing-store error surfaces.
    #[instrument(skip(self, content), fields(channel, author_role = %author_role))]
    pub fn append(
        &self,
        channel: &str,
        author_name: &str,
        author_role: AuthorRole,
        content: &str,
        created_at: &str,
        is_primary_entity: bool,
    ) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages
             (channel, author_name, author_role, content, created_at, is_primary_entity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                channel,
                author_name,
                author_role.to_string(),
                content,
                created_at,
                is_primary_entity as i64
            ],
        )?;
        Ok(db.last_insert_rowid())
    }

    /// Full-text search over message content, BM25-ranked with recency as
    /// the tiebreak.
    #[instrument(skip(self, query), fields(limit))]
    pub fn fts_search(
        &self,
        query: &str,
        limit: usize,
        channel_filter: Option<&str>,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut sql = String::from(
            "SELECT m.id, m.channel, m.author_name, m.author_role, m.content, m.created_at,
                    m.is_primary_entity, m.summary_id, m.graph_batch_id
             FROM messages_fts f
             JOIN messages m ON m.id = f.rowid
             WHERE messages_fts MATCH ?1",
        );
        let mut query_params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query.to_string())];

        if let Some(ch) = channel_filter {
            sql.push_str(" AND m.channel = ?");
            query_params.push(Box::new(ch.to_string()));
        }
        if let Some(s) = since {
            sql.push_str(" AND m.created_at >= ?");
            query_params.push(Box::new(s.to_string()));
        }
        if let Some(u) = until {
            sql.push_str(" AND m.created_at <= ?");
            query_params.push(Box::new(u.to_string()));
        }
        sql.push_str(" ORDER BY f.rank, m.created_at DESC LIMIT ?");
        query_params.push(Box::new(limit as i64));

        let mut stmt = db.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            query_params.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Messages with `start_id ≤ id ≤ end_id`, in id order.
    #[instrument(skip(self))]
    pub fn range(&self, start_id: i64, end_id: i64) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE id BETWEEN ?1 AND ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![start_id, end_id], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// `before` messages before `id`, `id` itself, and `after` messages
    /// after — 2*min(before,after)+1 messages total, strict id order,
    /// regardless of channel.
    #[instrument(skip(self))]
    pub fn window_around(&self, id: i64, before: usize, after: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE id <= ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let mut head: Vec<Message> = stmt
            .query_map(params![id, before as i64 + 1], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        head.reverse();

        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE id > ?1 ORDER BY id ASC LIMIT ?2",
        )?;
        let tail: Vec<Message> = stmt
            .query_map(params![id, after as i64], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();

        head.extend(tail);
        Ok(head)
    }

    /// The last `limit` messages across all channels, oldest first — used
    /// by the composer's startup mode to ground the agent regardless of
    /// query relevance.
    #[instrument(skip(self))]
    pub fn recent_window(&self, limit: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows: Vec<Message> = stmt
            .query_map(params![limit as i64], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn count_unsummarized(&self) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE summary_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Oldest `max` unsummarized messages, in id order — contiguous by
    /// construction since `summary_id` is only ever assigned in forward,
    /// non-overlapping sweeps.
    #[instrument(skip(self))]
    pub fn select_unsummarized(&self, max: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE summary_id IS NULL ORDER BY id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![max as i64], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Atomically stamp `ids` with `summary_id`. Fails with `Invariant` (via
    /// the caller, `anamnesis-crystals`) if any id already carries one — that
    /// check happens before this is called, inside a single transaction.
    #[instrument(skip(self, ids))]
    pub fn mark_summarized(&self, ids: &[i64], summary_id: i64) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages SET summary_id = ?1 WHERE id = ?2 AND summary_id IS NULL",
            )?;
            for id in ids {
                stmt.execute(params![summary_id, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn count_unungested(&self) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE graph_batch_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    #[instrument(skip(self))]
    pub fn select_unungested(&self, batch_size: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE graph_batch_id IS NULL ORDER BY id ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![batch_size as i64], row_to_message)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    #[instrument(skip(self, ids))]
    pub fn mark_ingested(&self, ids: &[i64], batch_id: i64) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE messages SET graph_batch_id = ?1 WHERE id = ?2 AND graph_batch_id IS NULL",
            )?;
            for id in ids {
                stmt.execute(params![batch_id, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<Message> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, channel, author_name, author_role, content, created_at,
                    is_primary_entity, summary_id, graph_batch_id
             FROM messages WHERE id = ?1",
            params![id],
            row_to_message,
        )
        .optional()?
        .ok_or(CaptureError::NotFound { id })
    }

    /// Cheap liveness probe for the health aggregator.
    #[instrument(skip(self))]
    pub fn health_check(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Counts of messages ingested under a real batch id vs. the sentinel
    /// batch id (schema-violation messages that were flagged, not retried).
    #[instrument(skip(self))]
    pub fn ingestion_counts(&self) -> Result<(i64, i64)> {
        let db = self.db.lock().unwrap();
        let succeeded: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE graph_batch_id IS NOT NULL AND graph_batch_id != 0",
            [],
            |row| row.get(0),
        )?;
        let sentinel: i64 = db.query_row(
            "SELECT COUNT(*) FROM messages WHERE graph_batch_id = 0",
            [],
            |row| row.get(0),
        )?;
        Ok((succeeded, sentinel))
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    let author_role = role_str.parse().unwrap_or(AuthorRole::User);
    Ok(Message {
        id: row.get(0)?,
        channel: row.get(1)?,
        author_name: row.get(2)?,
        author_role,
        content: row.get(4)?,
        created_at: row.get(5)?,
        is_primary_entity: row.get::<_, i64>(6)? != 0,
        summary_id: row.get(7)?,
        graph_batch_id: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CaptureStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        CaptureStore::new(conn)
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let s = store();
        let a = s
            .append("c1", "alice", AuthorRole::User, "hello", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let b = s
            .append("c1", "bot", AuthorRole::Assistant, "hi", "2026-01-01T00:00:01Z", false)
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn fts_search_finds_content() {
        let s = store();
        s.append("c1", "alice", AuthorRole::User, "the quick brown fox", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let results = s.fts_search("fox", 10, None, None, None).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("fox"));
    }

    #[test]
    fn window_around_is_strict_id_order_across_channels() {
        let s = store();
        for (ch, text) in [
            ("c1", "m1"),
            ("c2", "m2"),
            ("c3", "m3"),
            ("c1", "m4"),
            ("c2", "m5"),
        ] {
            s.append(ch, "a", AuthorRole::User, text, "2026-01-01T00:00:00Z", false)
                .unwrap();
        }
        let window = s.window_around(3, 2, 1).unwrap();
        let ids: Vec<i64> = window.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn mark_summarized_is_partial_function() {
        let s = store();
        let id = s
            .append("c1", "a", AuthorRole::User, "hi", "2026-01-01T00:00:00Z", false)
            .unwrap();
        s.mark_summarized(&[id], 1).unwrap();
        // Second stamp with a different summary must not overwrite.
        s.mark_summarized(&[id], 2).unwrap();
        let msg = s.get(id).unwrap();
        assert_eq!(msg.summary_id, Some(1));
    }

    #[test]
    fn select_unungested_respects_batch_size() {
        let s = store();
        for i in 0..5 {
            s.append("c1", "a", AuthorRole::User, &format!("m{i}"), "2026-01-01T00:00:00Z", false)
                .unwrap();
        }
        let batch = s.select_unungested(3).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(s.count_unungested().unwrap(), 5);
        let ids: Vec<i64> = batch.iter().map(|m| m.id).collect();
        s.mark_ingested(&ids, 42).unwrap();
        assert_eq!(s.count_unungested().unwrap(), 2);
    }
}
