use std::sync::Arc;

use anamnesis_anchors::{AnchorStore, EmbeddingClient, HttpEmbeddingClient};
use anamnesis_capture::CaptureStore;
use anamnesis_core::config::{AnamnesisConfig, EmbeddingsProviderConfig};
use anamnesis_core::clock::SystemClock;
use anamnesis_crystals::CrystalStore;
use anamnesis_health::HealthAggregator;
use anamnesis_ingest::{AnthropicCompletions, BatchStore, CompletionsProvider, IngestionController};
use anamnesis_inventory::InventoryStore;
use anamnesis_recall::Composer;
use anamnesis_texture::TextureStore;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

/// Central shared state — passed as `Arc<AppState>` to every tool handler,
/// the Axum router, and the stdio JSON-RPC loop alike. There is exactly one
/// of these per process; both transports dispatch through it.
pub struct AppState {
    pub config: AnamnesisConfig,
    pub capture: Arc<CaptureStore>,
    pub anchors: Arc<AnchorStore>,
    pub texture: Arc<TextureStore>,
    pub crystals: Arc<CrystalStore>,
    pub inventory: Arc<InventoryStore>,
    pub composer: Arc<Composer>,
    pub ingestion: Arc<IngestionController>,
    pub health: Arc<HealthAggregator>,
    /// Shared with the ingestion controller's extraction calls; `crystallize`
    /// reuses it for summarization prompts rather than opening a second
    /// HTTP client for the same provider.
    pub completions: Arc<dyn CompletionsProvider>,
    /// Admin ops (`sync`, `summarize`, `ingest_batch`) are cancellable only
    /// at this layer; keyed by an opaque operation id minted by the caller.
    pub active_operations: DashMap<String, CancellationToken>,
}

impl AppState {
    /// Opens every layer's own connection onto the configured stores and
    /// wires the composer, ingestion controller, and health aggregator on
    /// top of them. Each layer manager gets its own `rusqlite::Connection`
    /// onto the shared SQLite file, mirroring how `anamnesis-ingest`'s
    /// `BatchStore` opens its own connection onto L1's file rather than
    /// sharing a handle across crate boundaries.
    pub async fn build(config: AnamnesisConfig) -> anyhow::Result<Self> {
        let capture_conn = rusqlite::Connection::open(&config.database.path)?;
        anamnesis_capture::db::init_db(&capture_conn)?;
        let capture = Arc::new(CaptureStore::new(capture_conn));

        let crystals_conn = rusqlite::Connection::open(&config.database.path)?;
        anamnesis_crystals::db::init_db(&crystals_conn)?;
        let crystals = Arc::new(CrystalStore::new(crystals_conn));

        let inventory_conn = rusqlite::Connection::open(&config.database.path)?;
        anamnesis_inventory::db::init_db(&inventory_conn)?;
        let inventory = Arc::new(InventoryStore::new(inventory_conn));

        let anchors_conn = rusqlite::Connection::open(&config.database.path)?;
        anamnesis_anchors::db::init_db(&anchors_conn)?;
        let embedder: Box<dyn EmbeddingClient> = Box::new(HttpEmbeddingClient::new(
            &config.providers.embeddings.clone().unwrap_or_else(default_embeddings_config),
        ));
        let anchors = Arc::new(AnchorStore::new(anchors_conn, embedder));

        let texture = Arc::new(
            TextureStore::connect(&config.texture.endpoint, &config.texture.namespace, &config.texture.database)
                .await?,
        );

        let batches_conn = rusqlite::Connection::open(&config.database.path)?;
        anamnesis_ingest::db::init_db(&batches_conn)?;
        let batches = BatchStore::new(batches_conn);

        let completions: Arc<dyn CompletionsProvider> = Arc::new(AnthropicCompletions::new(
            config.providers.completions.clone().unwrap_or_else(default_completions_config),
        ));

        let health = Arc::new(HealthAggregator::new(
            capture.clone(),
            config.anchors.directory.clone(),
            texture.clone(),
            crystals.clone(),
            inventory.clone(),
        ));

        let primary_entity_name =
            std::env::var("PRIMARY_ENTITY_NAME").unwrap_or_else(|_| "primary".to_string());

        let composer = Arc::new(Composer::new(
            capture.clone(),
            anchors.clone(),
            texture.clone(),
            crystals.clone(),
            Arc::new(SystemClock),
            primary_entity_name,
            config.recall.soft_deadline_ms,
            config.recall.startup_window,
        ));

        // A dedup merge can fold the primary entity's node onto another
        // uuid; invalidate the cache so the next recall re-resolves it
        // instead of serving the now-stale cached node.
        let composer_for_hook = composer.clone();
        let ingestion = Arc::new(
            IngestionController::new(
                capture.clone(),
                texture.clone(),
                crystals.clone(),
                batches,
                completions.clone(),
                config.ingest.clone(),
                config.texture.dedup_threshold,
            )
            .with_dedup_merge_hook(move |name| {
                if name.eq_ignore_ascii_case(composer_for_hook.primary_entity_name()) {
                    composer_for_hook.primary_entity_cache().invalidate();
                }
            }),
        );

        Ok(Self {
            config,
            capture,
            anchors,
            texture,
            crystals,
            inventory,
            composer,
            ingestion,
            health,
            completions,
            active_operations: DashMap::new(),
        })
    }
}

fn default_embeddings_config() -> EmbeddingsProviderConfig {
    EmbeddingsProviderConfig {
        api_key: String::new(),
        base_url: "https://api.openai.com".to_string(),
        model: "text-embedding-3-small".to_string(),
    }
}

fn default_completions_config() -> anamnesis_core::config::CompletionsProviderConfig {
    anamnesis_core::config::CompletionsProviderConfig {
        api_key: String::new(),
        base_url: "https://api.anthropic.com".to_string(),
        model: "claude-sonnet-4-6".to_string(),
    }
}
