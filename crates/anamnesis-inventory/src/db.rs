use rusqlite::Connection;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "busy_timeout", 3000)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inventory_items (
            category            TEXT NOT NULL,
            name                TEXT NOT NULL,
            attributes          TEXT NOT NULL,
            description         TEXT NOT NULL,
            sensory_description TEXT NOT NULL DEFAULT '',
            PRIMARY KEY (category, name)
        );
        CREATE INDEX IF NOT EXISTS idx_inventory_category ON inventory_items(category);
        ",
    )
}
