use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecallMode {
    Startup,
    Normal,
}

impl Default for RecallMode {
    fn default() -> Self {
        RecallMode::Normal
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallRequest {
    pub context: String,
    #[serde(default = "default_limit_per_layer")]
    pub limit_per_layer: usize,
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
    #[serde(default)]
    pub mode: RecallMode,
}

fn default_limit_per_layer() -> usize {
    5
}

fn default_budget_chars() -> usize {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockBlock {
    pub timestamp: String,
    pub display: String,
    pub hour: u32,
    pub note: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestLayer {
    pub items: usize,
    pub chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub crystals: ManifestLayer,
    pub word_photos: ManifestLayer,
    pub rich_texture: ManifestLayer,
    pub summaries: ManifestLayer,
    pub recent_turns: ManifestLayer,
    pub total_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecallCounts {
    pub unsummarized: i64,
    pub unungested: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallPackage {
    pub clock: ClockBlock,
    pub memory_health: String,
    pub counts: RecallCounts,
    pub manifest: Manifest,
    pub formatted_context: String,
    pub latency_ms: f64,
}
