use serde::{Deserialize, Serialize};

/// A curated, human-written word-photo.
///
/// The markdown file at `source_path` is the source of truth; this struct
/// is the index's view of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub id: String,
    pub source_path: String,
    pub title: String,
    pub body: String,
    pub tags: Option<String>,
    /// `None` until a successful embed; `sync` leaves these files "pending
    /// embedding" on provider failure rather than blocking.
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub embedded_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAnchor {
    pub anchor: Anchor,
    pub score: f32,
}
