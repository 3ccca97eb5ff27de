use rusqlite::Connection;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; PRAGMA busy_timeout=3000;
        CREATE TABLE IF NOT EXISTS anchors (
            id              TEXT PRIMARY KEY,
            source_path     TEXT NOT NULL UNIQUE,
            title           TEXT NOT NULL,
            body            TEXT NOT NULL,
            tags            TEXT,
            embedding       BLOB,
            embedding_model TEXT,
            embedded_at     TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_anchors_source_path ON anchors(source_path);
        ",
    )
}

/// Pack an `f32` vector into a little-endian byte blob for SQLite storage.
pub fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    buf
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
