use rusqlite::Connection;

/// Initialise the capture schema on an already-open connection.
///
/// Idempotent — safe to call on every startup.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=3000;",
    )?;
    create_messages_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            channel         TEXT NOT NULL,
            author_name     TEXT NOT NULL,
            author_role     TEXT NOT NULL,
            content         TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            is_primary_entity INTEGER NOT NULL DEFAULT 0,
            summary_id      INTEGER,
            graph_batch_id  INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel);
        CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
        CREATE INDEX IF NOT EXISTS idx_messages_unsummarized ON messages(summary_id) WHERE summary_id IS NULL;
        CREATE INDEX IF NOT EXISTS idx_messages_unungested ON messages(graph_batch_id) WHERE graph_batch_id IS NULL;
        ",
    )
}

/// External-content FTS5 index over `messages.content`, synced manually on
/// every write (there is no delete path for messages, so no trigger is
/// needed for removal — L1 is append-only).
fn create_fts_index(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
            content,
            content='messages',
            content_rowid='id'
        );
        CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
            INSERT INTO messages_fts(rowid, content) VALUES (new.id, new.content);
        END;
        ",
    )
}
