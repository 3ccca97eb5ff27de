use rusqlite::Connection;

/// Opens its own connection onto the same SQLite file L1 writes to, in the
/// same one-connection-per-manager convention as L4/L5.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 3000)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS ingestion_batches (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            start_message_id  INTEGER NOT NULL,
            end_message_id    INTEGER NOT NULL,
            channels          TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            status            TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_ingestion_batches_status ON ingestion_batches(status);
        ",
    )
}
