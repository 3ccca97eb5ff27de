use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_GATEWAY_PORT: u16 = 8201;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_INGEST_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_INGEST_BATCH_SIZE: usize = 20;
pub const DEFAULT_MIN_SUMMARY_BATCH: usize = 20;
pub const DEFAULT_RECALL_BUDGET_CHARS: usize = 50_000;
pub const DEFAULT_RECALL_DEADLINE_MS: u64 = 500;

/// Top-level config (`anamnesis.toml` + `ANAMNESIS_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnamnesisConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub texture: TextureConfig,
    #[serde(default)]
    pub anchors: AnchorsConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub recall: RecallConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for AnamnesisConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_GATEWAY_PORT,
                bind: DEFAULT_BIND.to_string(),
            },
            database: DatabaseConfig::default(),
            texture: TextureConfig::default(),
            anchors: AnchorsConfig::default(),
            ingest: IngestConfig::default(),
            recall: RecallConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file backing L1 (raw capture), L4 (crystals) and L5 (inventory).
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureConfig {
    /// SurrealDB connection string. `mem://` for tests, `rocksdb://<path>` for
    /// a persisted on-disk store, or an address for a standalone `surrealdb`
    /// service.
    #[serde(default = "default_texture_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_texture_ns")]
    pub namespace: String,
    #[serde(default = "default_texture_db")]
    pub database: String,
    /// Minimum duplicate canonical nodes before a dedup merge is triggered.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: usize,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            endpoint: default_texture_endpoint(),
            namespace: default_texture_ns(),
            database: default_texture_db(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorsConfig {
    /// Directory of curated markdown word-photos. The on-disk file is the
    /// source of truth; the index is rebuilt from it.
    #[serde(default = "default_anchors_dir")]
    pub directory: String,
}

impl Default for AnchorsConfig {
    fn default() -> Self {
        Self {
            directory: default_anchors_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_ingest_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_ingest_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_ingest_slow_latency_ms")]
    pub slow_latency_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ingest_interval(),
            batch_size: default_ingest_batch_size(),
            max_batch_size: default_ingest_max_batch_size(),
            slow_latency_ms: default_ingest_slow_latency_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    #[serde(default = "default_limit_per_layer")]
    pub limit_per_layer: usize,
    #[serde(default = "default_budget_chars")]
    pub budget_chars: usize,
    #[serde(default = "default_soft_deadline_ms")]
    pub soft_deadline_ms: u64,
    /// How many raw recent turns to prepend in `startup` mode.
    #[serde(default = "default_startup_window")]
    pub startup_window: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            limit_per_layer: default_limit_per_layer(),
            budget_chars: default_budget_chars(),
            soft_deadline_ms: default_soft_deadline_ms(),
            startup_window: default_startup_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    /// The completions provider used for entity extraction and
    /// summarization prompts. The engine never calls it itself — see
    /// `anamnesis-texture`/`anamnesis-crystals` contracts, which hand back a
    /// prompt for the caller to execute.
    pub completions: Option<CompletionsProviderConfig>,
    /// The embeddings provider used by L2 and L3 for vector similarity.
    pub embeddings: Option<EmbeddingsProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionsProviderConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    format!("{}/anamnesis.db", claude_home())
}
fn default_texture_endpoint() -> String {
    format!("rocksdb://{}/texture.db", claude_home())
}
fn default_texture_ns() -> String {
    "anamnesis".to_string()
}
fn default_texture_db() -> String {
    "texture".to_string()
}
fn default_dedup_threshold() -> usize {
    5
}
fn default_anchors_dir() -> String {
    format!("{}/anchors", entity_path())
}
fn default_ingest_interval() -> u64 {
    DEFAULT_INGEST_INTERVAL_SECS
}
fn default_ingest_batch_size() -> usize {
    DEFAULT_INGEST_BATCH_SIZE
}
fn default_ingest_max_batch_size() -> usize {
    200
}
fn default_ingest_slow_latency_ms() -> u64 {
    4_000
}
fn default_max_reconnect_attempts() -> u32 {
    5
}
fn default_limit_per_layer() -> usize {
    5
}
fn default_budget_chars() -> usize {
    DEFAULT_RECALL_BUDGET_CHARS
}
fn default_soft_deadline_ms() -> u64 {
    DEFAULT_RECALL_DEADLINE_MS
}
fn default_startup_window() -> usize {
    20
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn claude_home() -> String {
    std::env::var("CLAUDE_HOME").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        format!("{home}/.anamnesis")
    })
}

fn entity_path() -> String {
    std::env::var("ENTITY_PATH").unwrap_or_else(|_| claude_home())
}

impl AnamnesisConfig {
    /// Load config from a TOML file with `ANAMNESIS_*` env var overrides.
    ///
    /// Checks, in order: explicit path argument, then
    /// `$CLAUDE_HOME/anamnesis.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AnamnesisConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("ANAMNESIS_").split("_"))
            .extract()
            .map_err(|e| crate::error::ApiError::new(crate::error::ErrorKind::Internal, e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/anamnesis.toml", claude_home())
}
