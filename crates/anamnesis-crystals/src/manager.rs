use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{CrystalError, Result};
use crate::types::{Stats, Summary, SummaryKind, SummaryRequest};

const DEFAULT_MIN_BATCH: i64 = 20;
const DEFAULT_ROLLING_WINDOW: usize = 8;

pub struct CrystalStore {
    db: Mutex<Connection>,
}

impl CrystalStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Builds the summarization prompt for the caller to execute against its
    /// own completions provider. Never calls an LLM itself.
    ///
    /// The unsummarized backlog is shared across kinds, so the pool is
    /// filtered by channel before selection: channels prefixed
    /// `reflection:` belong to `Reflection`, everything else to `Work`;
    /// `Mixed` draws from the whole backlog. Without this a reflection
    /// summarizer and a work summarizer racing the same tick would each
    /// drain messages the other kind should have covered.
    #[instrument(skip(self))]
    pub fn summarize_request(&self, kind: SummaryKind, max_messages: i64) -> Result<SummaryRequest> {
        let db = self.db.lock().unwrap();
        let channel_filter = match kind {
            SummaryKind::Work => "AND channel NOT LIKE 'reflection:%'",
            SummaryKind::Reflection => "AND channel LIKE 'reflection:%'",
            SummaryKind::Mixed => "",
        };
        let sql = format!(
            "SELECT id, channel, author_name, content FROM messages
             WHERE summary_id IS NULL {channel_filter}
             ORDER BY id ASC LIMIT ?1"
        );
        let mut stmt = db.prepare(&sql)?;
        let rows: Vec<(i64, String, String, String)> = stmt
            .query_map(params![max_messages], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .filter_map(|r| r.ok())
            .collect();

        let found = rows.len() as i64;
        if found == 0 {
            return Ok(SummaryRequest::NoMessages);
        }
        if found < DEFAULT_MIN_BATCH {
            return Ok(SummaryRequest::InsufficientMessages {
                found,
                min_batch: DEFAULT_MIN_BATCH,
            });
        }

        let start_id = rows.first().unwrap().0;
        let end_id = rows.last().unwrap().0;
        let mut channels: Vec<String> = rows.iter().map(|(_, c, _, _)| c.clone()).collect();
        channels.sort();
        channels.dedup();

        let transcript: String = rows
            .iter()
            .map(|(_, channel, author, content)| format!("[{channel}] {author}: {content}"))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Summarize the following {kind} conversation transcript in a few \
             dense paragraphs. Preserve names, decisions, and open questions; \
             drop small talk.\n\n{transcript}",
            kind = kind.as_str(),
        );

        Ok(SummaryRequest::Ready {
            prompt,
            message_range: (start_id, end_id),
            channels,
        })
    }

    /// Atomically inserts the summary and marks every covered message.
    #[instrument(skip(self, text))]
    pub fn store_summary(
        &self,
        text: &str,
        start_id: i64,
        end_id: i64,
        channels: &[String],
        kind: SummaryKind,
        now: &str,
    ) -> Result<i64> {
        if start_id > end_id {
            return Err(CrystalError::InvalidRange { start: start_id, end: end_id });
        }

        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let channels_json = serde_json::to_string(channels).unwrap_or_else(|_| "[]".to_string());

        tx.execute(
            "INSERT INTO summaries (text, start_message_id, end_message_id, channels, kind, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![text, start_id, end_id, channels_json, kind.as_str(), now],
        )?;
        let summary_id = tx.last_insert_rowid();

        let placeholders = vec!["?"; channels.len()].join(",");
        let sql = format!(
            "UPDATE messages SET summary_id = ?1
             WHERE id BETWEEN ?2 AND ?3 AND summary_id IS NULL AND channel IN ({placeholders})"
        );
        let mut stmt_params: Vec<&dyn rusqlite::ToSql> = vec![&summary_id, &start_id, &end_id];
        for channel in channels {
            stmt_params.push(channel);
        }
        tx.execute(&sql, stmt_params.as_slice())?;

        tx.commit()?;
        Ok(summary_id)
    }

    /// Rolling window first (most recent `DEFAULT_ROLLING_WINDOW`), then the
    /// rest of `k` from the archive.
    #[instrument(skip(self))]
    pub fn recent(&self, k: usize, kind: Option<SummaryKind>) -> Result<Vec<Summary>> {
        let db = self.db.lock().unwrap();
        let limit = k.max(DEFAULT_ROLLING_WINDOW) as i64;
        let summaries = match kind {
            Some(kind) => {
                let mut stmt = db.prepare(
                    "SELECT id, text, start_message_id, end_message_id, channels, kind, created_at
                     FROM summaries WHERE kind = ?1 ORDER BY created_at DESC LIMIT ?2",
                )?;
                stmt.query_map(params![kind.as_str(), limit], row_to_summary)?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT id, text, start_message_id, end_message_id, channels, kind, created_at
                     FROM summaries ORDER BY created_at DESC LIMIT ?1",
                )?;
                stmt.query_map(params![limit], row_to_summary)?
                    .filter_map(|r| r.ok())
                    .collect::<Vec<_>>()
            }
        };
        Ok(summaries.into_iter().take(k).collect())
    }

    #[instrument(skip(self))]
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Summary>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT s.id, s.text, s.start_message_id, s.end_message_id, s.channels, s.kind, s.created_at
             FROM summaries s
             JOIN summaries_fts f ON s.id = f.rowid
             WHERE summaries_fts MATCH ?1
             ORDER BY f.rank LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![query, k as i64], row_to_summary)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub fn stats(&self) -> Result<Stats> {
        let db = self.db.lock().unwrap();
        let mut count_by_kind = HashMap::new();
        {
            let mut stmt = db.prepare("SELECT kind, COUNT(*) FROM summaries GROUP BY kind")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
            for row in rows.filter_map(|r| r.ok()) {
                count_by_kind.insert(row.0, row.1);
            }
        }
        let oldest: Option<String> = db
            .query_row("SELECT MIN(created_at) FROM summaries", [], |row| row.get(0))
            .optional()?
            .flatten();
        let newest: Option<String> = db
            .query_row("SELECT MAX(created_at) FROM summaries", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(Stats { count_by_kind, oldest, newest })
    }

    #[instrument(skip(self))]
    pub fn turns_since_last(&self, kind: SummaryKind) -> Result<i64> {
        let db = self.db.lock().unwrap();
        let last_end: Option<i64> = db
            .query_row(
                "SELECT MAX(end_message_id) FROM summaries WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let count: i64 = match last_end {
            Some(end) => db.query_row(
                "SELECT COUNT(*) FROM messages WHERE id > ?1",
                params![end],
                |row| row.get(0),
            )?,
            None => db.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// Cheap liveness probe for the health aggregator.
    #[instrument(skip(self))]
    pub fn health_check(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<Summary> {
    let channels_json: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    Ok(Summary {
        id: row.get(0)?,
        text: row.get(1)?,
        start_message_id: row.get(2)?,
        end_message_id: row.get(3)?,
        channels: serde_json::from_str(&channels_json).unwrap_or_default(),
        kind: kind_str.parse().unwrap_or(SummaryKind::Mixed),
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CrystalStore {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                summary_id INTEGER
            );",
        )
        .unwrap();
        crate::db::init_db(&conn).unwrap();
        CrystalStore::new(conn)
    }

    fn seed_messages(store: &CrystalStore, count: i64) {
        let db = store.db.lock().unwrap();
        for i in 0..count {
            db.execute(
                "INSERT INTO messages (channel, author_name, content) VALUES (?1, ?2, ?3)",
                params!["c1", "alice", format!("message {i}")],
            )
            .unwrap();
        }
    }

    #[test]
    fn summarize_request_reports_insufficient_messages() {
        let store = store();
        seed_messages(&store, 5);
        match store.summarize_request(SummaryKind::Work, 100).unwrap() {
            SummaryRequest::InsufficientMessages { found, min_batch } => {
                assert_eq!(found, 5);
                assert_eq!(min_batch, DEFAULT_MIN_BATCH);
            }
            other => panic!("expected InsufficientMessages, got {other:?}"),
        }
    }

    #[test]
    fn store_summary_marks_covered_messages() {
        let store = store();
        seed_messages(&store, 25);
        let id = store
            .store_summary("a summary", 1, 20, &["c1".to_string()], SummaryKind::Work, "2026-01-01T00:00:00Z")
            .unwrap();
        assert!(id > 0);

        let remaining = store.turns_since_last(SummaryKind::Work).unwrap();
        assert_eq!(remaining, 5);
    }

    #[test]
    fn summarize_request_only_pools_messages_for_its_own_kind() {
        let store = store();
        {
            let db = store.db.lock().unwrap();
            for i in 0..25 {
                db.execute(
                    "INSERT INTO messages (channel, author_name, content) VALUES (?1, ?2, ?3)",
                    params!["c1", "alice", format!("work message {i}")],
                )
                .unwrap();
            }
            for i in 0..25 {
                db.execute(
                    "INSERT INTO messages (channel, author_name, content) VALUES (?1, ?2, ?3)",
                    params!["reflection:uuid-1", "alice", format!("reflection message {i}")],
                )
                .unwrap();
            }
        }

        match store.summarize_request(SummaryKind::Work, 100).unwrap() {
            SummaryRequest::Ready { channels, .. } => {
                assert_eq!(channels, vec!["c1".to_string()]);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
        match store.summarize_request(SummaryKind::Reflection, 100).unwrap() {
            SummaryRequest::Ready { channels, .. } => {
                assert_eq!(channels, vec!["reflection:uuid-1".to_string()]);
            }
            other => panic!("expected Ready, got {other:?}"),
        }
    }

    #[test]
    fn summaries_may_overlap_across_kinds() {
        // Open Question decision: the non-overlap invariant only applies
        // within (channel, kind); two summaries of different kinds can
        // cover the same message range.
        let store = store();
        seed_messages(&store, 25);
        store
            .store_summary("work summary", 1, 20, &["c1".to_string()], SummaryKind::Work, "2026-01-01T00:00:00Z")
            .unwrap();
        let overlapping = store.store_summary(
            "reflection summary",
            1,
            20,
            &["c1".to_string()],
            SummaryKind::Reflection,
            "2026-01-01T00:00:01Z",
        );
        assert!(overlapping.is_ok());
    }
}
