use rusqlite::Connection;

/// Opens its own connection onto the same SQLite file L1 writes to — one
/// connection per manager onto a shared `database.path`, rather than a
/// connection pool shared across crates.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 3000)?;
    create_summaries_table(conn)?;
    create_fts_index(conn)
}

fn create_summaries_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS summaries (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            text            TEXT NOT NULL,
            start_message_id INTEGER NOT NULL,
            end_message_id  INTEGER NOT NULL,
            channels        TEXT NOT NULL,
            kind            TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_summaries_kind_created ON summaries(kind, created_at);
        CREATE INDEX IF NOT EXISTS idx_summaries_range ON summaries(start_message_id, end_message_id);
        ",
    )
}

fn create_fts_index(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE VIRTUAL TABLE IF NOT EXISTS summaries_fts USING fts5(
            text,
            content='summaries',
            content_rowid='id'
        );
        CREATE TRIGGER IF NOT EXISTS summaries_ai AFTER INSERT ON summaries BEGIN
            INSERT INTO summaries_fts(rowid, text) VALUES (new.id, new.text);
        END;
        ",
    )
}
