use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anamnesis_capture::CaptureStore;
use anamnesis_core::config::IngestConfig;
use anamnesis_crystals::CrystalStore;
use anamnesis_texture::{dedup, extraction, EpisodeMetadata, ExtractionContext, GraphEpisode, TextureStore};
use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use crate::completions::{is_transient, CompletionsProvider};
use crate::error::{IngestError, Result};
use crate::store::BatchStore;
use crate::types::{BatchStatus, TickOutcome};

/// Paced drain of L1's backlog into L3. A `tokio::time::interval` plus
/// `tokio::select!` against a shutdown signal, with `tick()` factored out
/// so it is independently testable without the timer.
pub struct IngestionController {
    capture: Arc<CaptureStore>,
    texture: Arc<TextureStore>,
    crystals: Arc<CrystalStore>,
    batches: BatchStore,
    completions: Arc<dyn CompletionsProvider>,
    config: IngestConfig,
    dedup_threshold: usize,
    batch_size: AtomicUsize,
    on_dedup_merge: Option<Box<dyn Fn(&str) + Send + Sync>>,
}

impl IngestionController {
    pub fn new(
        capture: Arc<CaptureStore>,
        texture: Arc<TextureStore>,
        crystals: Arc<CrystalStore>,
        batches: BatchStore,
        completions: Arc<dyn CompletionsProvider>,
        config: IngestConfig,
        dedup_threshold: usize,
    ) -> Self {
        let batch_size = AtomicUsize::new(config.batch_size);
        Self {
            capture,
            texture,
            crystals,
            batches,
            completions,
            config,
            dedup_threshold,
            batch_size,
            on_dedup_merge: None,
        }
    }

    /// Registers a callback invoked with the canonical name of every
    /// entity a dedup merge folds onto during a tick — used by the gateway
    /// to invalidate the primary-entity cache when a merge could have
    /// changed its uuid.
    pub fn with_dedup_merge_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_dedup_merge = Some(Box::new(hook));
        self
    }

    /// Main loop. Ticks every `interval_secs` until `shutdown` broadcasts
    /// `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("ingestion controller started");
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.tick().await {
                        Ok(TickOutcome::Idle) => {}
                        Ok(TickOutcome::Completed { batch_id, status, succeeded, failed, latency_ms }) => {
                            info!(batch_id, %status, succeeded, failed, latency_ms, "ingestion batch complete");
                        }
                        Err(e) => error!("ingestion tick error: {e}"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("ingestion controller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One drain iteration: select a batch off L1, extract+ingest each
    /// message into L3, then atomically settle the batch and mark the
    /// messages ingested.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<TickOutcome> {
        let started = Instant::now();
        let n = self.capture.count_unungested()?;
        if n == 0 {
            return Ok(TickOutcome::Idle);
        }

        let batch_size = self.batch_size.load(Ordering::Relaxed);
        let messages = self.capture.select_unungested(batch_size)?;
        if messages.is_empty() {
            return Ok(TickOutcome::Idle);
        }

        let start_id = messages.first().unwrap().id;
        let end_id = messages.last().unwrap().id;
        let mut channels: Vec<String> = messages.iter().map(|m| m.channel.clone()).collect();
        channels.sort();
        channels.dedup();

        let now = Utc::now().to_rfc3339();
        let batch = self.batches.create_batch(start_id, end_id, &channels, &now)?;

        let mut succeeded_ids = Vec::new();
        let mut sentinel_ids = Vec::new();
        let mut any_transient_failure = false;
        let recent_summary = self.recent_summary_text();
        let mut scene: Vec<String> = Vec::new();
        let mut touched_names: Vec<String> = Vec::new();

        for message in &messages {
            let episode = GraphEpisode {
                episode_name: format!("msg-{}", message.id),
                body: message.content.clone(),
                metadata: EpisodeMetadata {
                    channel: message.channel.clone(),
                    speaker: message.author_name.clone(),
                    role: message.author_role.to_string(),
                    timestamp: message.created_at.clone(),
                },
            };
            let context = ExtractionContext {
                recent_summary: recent_summary.clone(),
                current_scene: scene.clone(),
            };

            match self.ingest_episode(&episode, &now, &context).await {
                Ok(names) => {
                    succeeded_ids.push(message.id);
                    scene.extend(names.iter().cloned());
                    touched_names.extend(names);
                }
                Err(IngestError::SchemaViolation(reason)) => {
                    warn!(message_id = message.id, %reason, "schema-violation; marking sentinel");
                    sentinel_ids.push(message.id);
                }
                Err(e) => {
                    warn!(message_id = message.id, error = %e, "message failed ingestion after retries");
                    any_transient_failure = true;
                }
            }
        }

        if !succeeded_ids.is_empty() {
            self.capture.mark_ingested(&succeeded_ids, batch.id)?;
        }
        if !sentinel_ids.is_empty() {
            self.capture
                .mark_ingested(&sentinel_ids, anamnesis_core::BatchId::SENTINEL.0)?;
        }

        self.dedup_touched_entities(touched_names).await;

        let failed = messages.len() - succeeded_ids.len() - sentinel_ids.len();
        let status = if failed > 0 && succeeded_ids.is_empty() {
            BatchStatus::Failed
        } else if failed > 0 || !sentinel_ids.is_empty() {
            BatchStatus::Partial
        } else {
            BatchStatus::Succeeded
        };
        self.batches.mark_status(batch.id, status)?;

        let elapsed = started.elapsed();
        self.adjust_batch_size(elapsed, messages.len(), any_transient_failure);

        Ok(TickOutcome::Completed {
            batch_id: batch.id,
            status,
            succeeded: succeeded_ids.len(),
            failed,
            latency_ms: elapsed.as_secs_f64() * 1000.0,
        })
    }

    async fn ingest_episode(
        &self,
        episode: &GraphEpisode,
        now: &str,
        context: &ExtractionContext,
    ) -> Result<Vec<String>> {
        let prompt = extraction::build_prompt(episode, context);
        let raw = self.call_with_retry(&prompt).await?;

        let result: extraction::ExtractionResult = serde_json::from_str(&raw)
            .map_err(|e| IngestError::SchemaViolation(format!("unparsable extraction response: {e}")))?;
        let result = extraction::validate(result);

        let mut uuids = std::collections::HashMap::new();
        for entity in &result.entities {
            if entity.types.is_empty() {
                return Err(IngestError::SchemaViolation(format!(
                    "entity {} has no closed-schema type",
                    entity.name
                )));
            }
            let node = self
                .texture
                .upsert_entity(&entity.name, entity.types.clone(), &entity.summary, now)
                .await?;
            uuids.insert(entity.name.clone(), node.uuid);
        }

        for edge in &result.edges {
            let (Some(source), Some(target)) =
                (uuids.get(&edge.source_name), uuids.get(&edge.target_name))
            else {
                continue;
            };
            self.texture
                .create_edge(source, target, edge.predicate, &edge.fact, now, now)
                .await?;
        }

        Ok(uuids.into_keys().collect())
    }

    /// Most recent crystallized summary text, used as ambient disambiguation
    /// context for extraction. Absent any summary yet, extraction proceeds
    /// without it.
    fn recent_summary_text(&self) -> Option<String> {
        self.crystals
            .recent(1, None)
            .ok()?
            .into_iter()
            .next()
            .map(|s| s.text)
    }

    /// Runs dedup over the entity names an ingestion batch touched and
    /// folds any duplicate groups found, invoking the merge hook (if
    /// registered) with each merged group's canonical name so the gateway
    /// can invalidate a stale primary-entity cache entry.
    async fn dedup_touched_entities(&self, mut touched_names: Vec<String>) {
        if touched_names.is_empty() {
            return;
        }
        touched_names.sort();
        touched_names.dedup();

        let groups = match dedup::scan(&self.texture, &touched_names, self.dedup_threshold).await {
            Ok(groups) => groups,
            Err(e) => {
                warn!(error = %e, "dedup scan failed; skipping this tick");
                return;
            }
        };

        for group in groups {
            match dedup::merge_group(&self.texture, &group, false).await {
                Ok(outcome) => {
                    info!(name = %group.name, removed = outcome.removed.len(), "dedup merge applied");
                    if let Some(hook) = &self.on_dedup_merge {
                        hook(&group.name);
                    }
                }
                Err(e) => warn!(name = %group.name, error = %e, "dedup merge failed"),
            }
        }
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0u32;
        loop {
            match self.completions.complete(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if is_transient(&e) && attempt < self.config.max_reconnect_attempts => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    warn!(attempt, backoff_ms = backoff.as_millis() as u64, "retrying completion after transient error");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn adjust_batch_size(&self, elapsed: Duration, message_count: usize, any_failure: bool) {
        if message_count == 0 || any_failure {
            return;
        }
        let avg_ms = elapsed.as_millis() as u64 / message_count as u64;
        let current = self.batch_size.load(Ordering::Relaxed);
        let next = if avg_ms > self.config.slow_latency_ms {
            (current / 2).max(1)
        } else {
            (current * 2).min(self.config.max_batch_size)
        };
        if next != current {
            info!(from = current, to = next, avg_ms, "adjusted ingestion batch size");
            self.batch_size.store(next, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anamnesis_capture::db::init_db as init_capture_db;
    use async_trait::async_trait;
    use rusqlite::Connection;
    use std::sync::Mutex;

    struct CannedCompletions {
        response: String,
    }

    #[async_trait]
    impl CompletionsProvider for CannedCompletions {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.response.clone())
        }
    }

    struct FlakyCompletions {
        remaining_failures: Mutex<u32>,
        response: String,
    }

    #[async_trait]
    impl CompletionsProvider for FlakyCompletions {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IngestError::Provider("transient: connection reset".to_string()));
            }
            Ok(self.response.clone())
        }
    }

    fn capture_store() -> Arc<CaptureStore> {
        let conn = Connection::open_in_memory().unwrap();
        init_capture_db(&conn).unwrap();
        Arc::new(CaptureStore::new(conn))
    }

    async fn texture_store() -> Arc<TextureStore> {
        Arc::new(TextureStore::connect("mem://", "test", "test").await.unwrap())
    }

    fn batch_store() -> BatchStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        BatchStore::new(conn)
    }

    fn crystals_store() -> Arc<CrystalStore> {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                author_name TEXT NOT NULL,
                content TEXT NOT NULL,
                summary_id INTEGER
            );",
        )
        .unwrap();
        anamnesis_crystals::db::init_db(&conn).unwrap();
        Arc::new(CrystalStore::new(conn))
    }

    fn extraction_json() -> String {
        serde_json::to_string(&serde_json::json!({
            "entities": [
                {"name": "Alice", "types": ["person"], "summary": "mentioned in conversation"},
                {"name": "Bob", "types": ["person"], "summary": "mentioned in conversation"}
            ],
            "edges": [
                {"source_name": "Alice", "target_name": "Bob", "predicate": "knows", "fact": "Alice likes Bob"}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn tick_is_idle_with_no_backlog() {
        let capture = capture_store();
        let texture = texture_store().await;
        let batches = batch_store();
        let completions = Arc::new(CannedCompletions { response: extraction_json() });
        let controller = IngestionController::new(
            capture,
            texture,
            crystals_store(),
            batches,
            completions,
            IngestConfig::default(),
            5,
        );

        let outcome = controller.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::Idle));
    }

    #[tokio::test]
    async fn tick_ingests_a_message_and_settles_the_batch() {
        let capture = capture_store();
        capture
            .append("c1", "alice", anamnesis_capture::AuthorRole::User, "Alice likes Bob", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let texture = texture_store().await;
        let batches = batch_store();
        let completions = Arc::new(CannedCompletions { response: extraction_json() });
        let controller = IngestionController::new(
            capture.clone(),
            texture.clone(),
            crystals_store(),
            batches,
            completions,
            IngestConfig::default(),
            5,
        );

        let outcome = controller.tick().await.unwrap();
        match outcome {
            TickOutcome::Completed { status, succeeded, failed, .. } => {
                assert_eq!(status, BatchStatus::Succeeded);
                assert_eq!(succeeded, 1);
                assert_eq!(failed, 0);
            }
            TickOutcome::Idle => panic!("expected a completed batch"),
        }
        assert_eq!(capture.count_unungested().unwrap(), 0);

        let alice = texture.find_entity_by_name("Alice", &[]).await.unwrap().unwrap();
        assert_eq!(alice.name, "Alice");
    }

    #[tokio::test]
    async fn transient_provider_errors_retry_before_succeeding() {
        let capture = capture_store();
        capture
            .append("c1", "alice", anamnesis_capture::AuthorRole::User, "Alice likes Bob", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let texture = texture_store().await;
        let batches = batch_store();
        let completions = Arc::new(FlakyCompletions {
            remaining_failures: Mutex::new(2),
            response: extraction_json(),
        });
        let controller = IngestionController::new(
            capture.clone(),
            texture,
            crystals_store(),
            batches,
            completions,
            IngestConfig::default(),
            5,
        );

        let outcome = controller.tick().await.unwrap();
        match outcome {
            TickOutcome::Completed { succeeded, .. } => assert_eq!(succeeded, 1),
            TickOutcome::Idle => panic!("expected a completed batch"),
        }
    }

    #[tokio::test]
    async fn unparsable_response_is_marked_sentinel_not_retried() {
        let capture = capture_store();
        capture
            .append("c1", "alice", anamnesis_capture::AuthorRole::User, "garbled input", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let texture = texture_store().await;
        let batches = batch_store();
        let completions = Arc::new(CannedCompletions { response: "not json".to_string() });
        let controller = IngestionController::new(
            capture.clone(),
            texture,
            crystals_store(),
            batches,
            completions,
            IngestConfig::default(),
            5,
        );

        let outcome = controller.tick().await.unwrap();
        match outcome {
            TickOutcome::Completed { status, succeeded, .. } => {
                assert_eq!(status, BatchStatus::Partial);
                assert_eq!(succeeded, 0);
            }
            TickOutcome::Idle => panic!("expected a completed batch"),
        }
        // Sentinel-marked messages still drain the backlog.
        assert_eq!(capture.count_unungested().unwrap(), 0);
    }

    #[tokio::test]
    async fn dedup_merge_hook_is_wired_and_silent_without_duplicates() {
        let capture = capture_store();
        capture
            .append("c1", "alice", anamnesis_capture::AuthorRole::User, "Alice likes Bob", "2026-01-01T00:00:00Z", false)
            .unwrap();
        let texture = texture_store().await;
        let batches = batch_store();
        let completions = Arc::new(CannedCompletions { response: extraction_json() });
        let hook_calls = Arc::new(Mutex::new(Vec::new()));
        let hook_calls_clone = hook_calls.clone();
        let controller = IngestionController::new(
            capture,
            texture,
            crystals_store(),
            batches,
            completions,
            IngestConfig::default(),
            5,
        )
        .with_dedup_merge_hook(move |name| hook_calls_clone.lock().unwrap().push(name.to_string()));

        controller.tick().await.unwrap();
        // A fresh ingest with no prior duplicates never triggers a merge.
        assert!(hook_calls.lock().unwrap().is_empty());
    }
}
