use std::path::Path;
use std::sync::Mutex;

use anamnesis_core::ids::AnchorId;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::db::{decode_embedding, encode_embedding};
use crate::embedding::{cosine_similarity, EmbeddingClient};
use crate::error::{AnchorError, Result};
use crate::types::{Anchor, ScoredAnchor};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub pending_embedding: usize,
}

/// Manager for the curated word-photo index (L2).
///
/// The markdown file is the source of truth; this store
/// is a read/index-only mirror kept current by `sync`.
pub struct AnchorStore {
    db: Mutex<Connection>,
    embedder: Box<dyn EmbeddingClient>,
}

impl AnchorStore {
    pub fn new(conn: Connection, embedder: Box<dyn EmbeddingClient>) -> Self {
        Self {
            db: Mutex::new(conn),
            embedder,
        }
    }

    /// Scan `directory` for `*.md` files, inserting new ones, re-embedding
    /// changed ones, and — if `prune` — removing index entries whose file
    /// disappeared.
    #[instrument(skip(self))]
    pub async fn sync(&self, directory: &Path, prune: bool) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut seen_paths = Vec::new();

        if !directory.exists() {
            return Ok(report);
        }

        let mut entries = tokio_read_dir(directory)?;
        entries.sort();

        for path in entries {
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            let path_str = path.to_string_lossy().to_string();
            seen_paths.push(path_str.clone());

            let body = std::fs::read_to_string(&path)?;
            let (title, tags, body) = parse_frontmatter(&path, &body);
            let id = AnchorId::from_content(&path_str, &body);

            let existing_id: Option<String> = {
                let db = self.db.lock().unwrap();
                db.query_row(
                    "SELECT id FROM anchors WHERE source_path = ?1",
                    params![path_str],
                    |row| row.get(0),
                )
                .optional()?
            };

            match existing_id {
                Some(prev_id) if prev_id == id.as_str() => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => report.updated += 1,
                None => report.added += 1,
            }

            let embed_result = self.embedder.embed(&body).await;
            let (embedding, embedding_model, embedded_at) = match embed_result {
                Ok(vec) => (
                    Some(vec),
                    Some(self.embedder.model_name().to_string()),
                    Some(chrono::Utc::now().to_rfc3339()),
                ),
                Err(e) => {
                    warn!(error = %e, path = %path_str, "embedding failed, anchor left pending");
                    report.pending_embedding += 1;
                    (None, None, None)
                }
            };

            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO anchors (id, source_path, title, body, tags, embedding, embedding_model, embedded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(source_path) DO UPDATE SET
                    id = excluded.id, title = excluded.title, body = excluded.body,
                    tags = excluded.tags, embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model, embedded_at = excluded.embedded_at",
                params![
                    id.as_str(),
                    path_str,
                    title,
                    body,
                    tags,
                    embedding.as_ref().map(|v| encode_embedding(v)),
                    embedding_model,
                    embedded_at,
                ],
            )?;
        }

        if prune {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare("SELECT source_path FROM anchors")?;
            let indexed: Vec<String> = stmt
                .query_map([], |row| row.get(0))?
                .filter_map(|r| r.ok())
                .collect();
            for path in indexed {
                if !seen_paths.contains(&path) {
                    db.execute("DELETE FROM anchors WHERE source_path = ?1", params![path])?;
                    report.removed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Brute-force cosine search over embedded anchors. Anchors are curated
    /// and small in number by construction, so no ANN index is warranted
    ///.
    #[instrument(skip(self, query))]
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredAnchor>> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };

        let rows: Vec<(Anchor, Option<Vec<u8>>)> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(
                "SELECT id, source_path, title, body, tags, embedding, embedding_model, embedded_at FROM anchors",
            )?;
            stmt.query_map([], row_to_anchor_with_blob)?
                .filter_map(|r| r.ok())
                .collect()
        };

        let mut scored: Vec<ScoredAnchor> = rows
            .into_iter()
            .filter_map(|(anchor, blob)| {
                let model_matches = anchor.embedding_model.as_deref() == Some(self.embedder.model_name());
                if !model_matches {
                    return None;
                }
                let vec = decode_embedding(&blob?);
                let score = cosine_similarity(&query_embedding, &vec);
                Some(ScoredAnchor { anchor, score })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Write a new word-photo to disk and index it in one pass — the file is
    /// the source of truth, so this both creates it and syncs it.
    #[instrument(skip(self, body))]
    pub async fn save(&self, directory: &Path, title: &str, body: &str, tags: Option<&str>) -> Result<String> {
        std::fs::create_dir_all(directory)?;
        let file_name = format!("{}.md", slugify(title));
        let path = directory.join(&file_name);
        let mut contents = String::new();
        if let Some(tags) = tags {
            contents.push_str(&format!("---\ntags: {tags}\n---\n"));
        }
        contents.push_str(&format!("# {title}\n\n{body}\n"));
        std::fs::write(&path, &contents)?;
        self.sync(directory, false).await?;
        Ok(path.to_string_lossy().to_string())
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &str, remove_file: bool) -> Result<()> {
        let db = self.db.lock().unwrap();
        let source_path: Option<String> = db
            .query_row("SELECT source_path FROM anchors WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        let source_path = source_path.ok_or_else(|| AnchorError::NotFound { id: id.to_string() })?;
        db.execute("DELETE FROM anchors WHERE id = ?1", params![id])?;
        if remove_file {
            let _ = std::fs::remove_file(&source_path);
        }
        Ok(())
    }
}

fn row_to_anchor_with_blob(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Anchor, Option<Vec<u8>>)> {
    let blob: Option<Vec<u8>> = row.get(5)?;
    Ok((
        Anchor {
            id: row.get(0)?,
            source_path: row.get(1)?,
            title: row.get(2)?,
            body: row.get(3)?,
            tags: row.get(4)?,
            embedding: None,
            embedding_model: row.get(6)?,
            embedded_at: row.get(7)?,
        },
        blob,
    ))
}

/// Splits an optional `---\ntags: ...\n---\n` header off the front of a
/// word-photo and derives a title from the first `# heading` or the
/// filename.
fn parse_frontmatter(path: &Path, raw: &str) -> (String, Option<String>, String) {
    let mut tags = None;
    let mut body = raw;

    if let Some(rest) = raw.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---\n") {
            let header = &rest[..end];
            for line in header.lines() {
                if let Some(value) = line.strip_prefix("tags:") {
                    tags = Some(value.trim().to_string());
                }
            }
            body = &rest[end + 5..];
        }
    }

    let title = body
        .lines()
        .find(|l| l.starts_with("# "))
        .map(|l| l.trim_start_matches("# ").to_string())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "untitled".to_string())
        });

    (title, tags, body.trim().to_string())
}

fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn tokio_read_dir(dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        out.push(entry?.path());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingClient for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            // Deterministic "embedding": character frequency of a/b/c, so
            // semantically similar fixtures land close together without a
            // network call.
            let mut v = vec![0.0f32; 3];
            for c in text.chars() {
                match c {
                    'a' => v[0] += 1.0,
                    'b' => v[1] += 1.0,
                    'c' => v[2] += 1.0,
                    _ => {}
                }
            }
            Ok(v)
        }

        fn model_name(&self) -> &str {
            "fake-v1"
        }
    }

    fn store(dir: &Path) -> AnchorStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        let _ = dir;
        AnchorStore::new(conn, Box::new(FakeEmbedder))
    }

    #[tokio::test]
    async fn sync_adds_then_updates_then_removes() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());

        std::fs::write(tmp.path().join("one.md"), "# One\n\naaa").unwrap();
        let report = store.sync(tmp.path(), true).await.unwrap();
        assert_eq!(report.added, 1);

        let report = store.sync(tmp.path(), true).await.unwrap();
        assert_eq!(report.unchanged, 1);

        std::fs::write(tmp.path().join("one.md"), "# One\n\nbbb").unwrap();
        let report = store.sync(tmp.path(), true).await.unwrap();
        assert_eq!(report.updated, 1);

        std::fs::remove_file(tmp.path().join("one.md")).unwrap();
        let report = store.sync(tmp.path(), true).await.unwrap();
        assert_eq!(report.removed, 1);

        let results = store.search("", 10).await.unwrap();
        assert_eq!(results.len(), 0);
    }

    #[tokio::test]
    async fn search_ranks_by_cosine_similarity() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store(tmp.path());
        std::fs::write(tmp.path().join("a.md"), "# A\n\naaaaaa").unwrap();
        std::fs::write(tmp.path().join("b.md"), "# B\n\nbbbbbb").unwrap();
        store.sync(tmp.path(), false).await.unwrap();

        let results = store.search("aaa", 5).await.unwrap();
        assert_eq!(results[0].anchor.title, "A");
    }
}
