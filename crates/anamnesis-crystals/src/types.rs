use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    Work,
    Reflection,
    Mixed,
}

impl SummaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Work => "work",
            SummaryKind::Reflection => "reflection",
            SummaryKind::Mixed => "mixed",
        }
    }
}

impl std::str::FromStr for SummaryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "work" => Ok(SummaryKind::Work),
            "reflection" => Ok(SummaryKind::Reflection),
            "mixed" => Ok(SummaryKind::Mixed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub id: i64,
    pub text: String,
    pub start_message_id: i64,
    pub end_message_id: i64,
    pub channels: Vec<String>,
    pub kind: SummaryKind,
    pub created_at: String,
}

/// Either a prompt ready for the caller to execute, or the reason none was
/// produced. `summarize_request` never calls an LLM itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryRequest {
    Ready {
        prompt: String,
        message_range: (i64, i64),
        channels: Vec<String>,
    },
    NoMessages,
    InsufficientMessages { found: i64, min_batch: i64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub count_by_kind: HashMap<String, i64>,
    pub oldest: Option<String>,
    pub newest: Option<String>,
}
