use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Succeeded,
    Partial,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Succeeded => "succeeded",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "succeeded" => Ok(BatchStatus::Succeeded),
            "partial" => Ok(BatchStatus::Partial),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("unknown batch status: {other}")),
        }
    }
}

/// L3 ingestion bookkeeping row. On `succeeded`, every `Message.id` in
/// `[start_message_id, end_message_id]` has `graph_batch_id = id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionBatch {
    pub id: i64,
    pub start_message_id: i64,
    pub end_message_id: i64,
    pub channels: Vec<String>,
    pub created_at: String,
    pub status: BatchStatus,
}

/// Result of a single controller tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    Idle,
    Completed {
        batch_id: i64,
        status: BatchStatus,
        succeeded: usize,
        failed: usize,
        latency_ms: f64,
    },
}
