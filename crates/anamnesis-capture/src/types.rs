use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a captured message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorRole::User => write!(f, "user"),
            AuthorRole::Assistant => write!(f, "assistant"),
            AuthorRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for AuthorRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(AuthorRole::User),
            "assistant" => Ok(AuthorRole::Assistant),
            "system" => Ok(AuthorRole::System),
            other => Err(format!("unknown author role: {other}")),
        }
    }
}

/// A single captured message — the source-of-truth unit of L1.
///
/// `summary_id`/`graph_batch_id` are ingestion bookkeeping: once non-`None`
/// they are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel: String,
    pub author_name: String,
    pub author_role: AuthorRole,
    pub content: String,
    pub created_at: String,
    pub is_primary_entity: bool,
    pub summary_id: Option<i64>,
    pub graph_batch_id: Option<i64>,
}
