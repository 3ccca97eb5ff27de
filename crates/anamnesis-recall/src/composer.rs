//! The ambient-recall fan-out: the single place in this codebase that
//! spawns concurrent siblings and gathers them (everything else is linear
//! async), with per-layer calls wrapped in `tokio::time::timeout`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Timelike;
use sha2::{Digest, Sha256};
use tokio::time::timeout;
use tracing::{instrument, warn};

use anamnesis_anchors::AnchorStore;
use anamnesis_capture::CaptureStore;
use anamnesis_core::clock::{time_of_day_note, Clock};
use anamnesis_crystals::CrystalStore;
use anamnesis_texture::TextureStore;

use crate::budget::fit_budget;
use crate::primary::PrimaryEntityCache;
use crate::types::{ClockBlock, Manifest, ManifestLayer, RecallCounts, RecallMode, RecallPackage, RecallRequest};

pub struct Composer {
    capture: Arc<CaptureStore>,
    anchors: Arc<AnchorStore>,
    texture: Arc<TextureStore>,
    crystals: Arc<CrystalStore>,
    primary_cache: Arc<PrimaryEntityCache>,
    clock: Arc<dyn Clock + Send + Sync>,
    primary_entity_name: String,
    soft_deadline: Duration,
    startup_window: usize,
}

impl Composer {
    pub fn new(
        capture: Arc<CaptureStore>,
        anchors: Arc<AnchorStore>,
        texture: Arc<TextureStore>,
        crystals: Arc<CrystalStore>,
        clock: Arc<dyn Clock + Send + Sync>,
        primary_entity_name: String,
        soft_deadline_ms: u64,
        startup_window: usize,
    ) -> Self {
        Self {
            capture,
            anchors,
            texture,
            crystals,
            primary_cache: Arc::new(PrimaryEntityCache::new()),
            clock,
            primary_entity_name,
            soft_deadline: Duration::from_millis(soft_deadline_ms),
            startup_window,
        }
    }

    pub fn primary_entity_cache(&self) -> Arc<PrimaryEntityCache> {
        self.primary_cache.clone()
    }

    pub fn primary_entity_name(&self) -> &str {
        &self.primary_entity_name
    }

    #[instrument(skip(self, request), fields(mode = ?request.mode))]
    pub async fn ambient_recall(&self, request: RecallRequest) -> RecallPackage {
        let started = Instant::now();
        let now = self.clock.now();
        let now_str = now.to_rfc3339();
        let limit = request.limit_per_layer;

        let crystals = self.crystals.clone();
        let crystals_recent = {
            let crystals = crystals.clone();
            async move {
                tokio::task::spawn_blocking(move || crystals.recent(limit, None))
                    .await
                    .unwrap_or(Ok(Vec::new()))
            }
        };

        let anchors_search = self.anchors.search(&request.context, limit);

        let crystals_search = {
            let crystals = crystals.clone();
            let query = request.context.clone();
            async move {
                tokio::task::spawn_blocking(move || crystals.search(&query, limit))
                    .await
                    .unwrap_or(Ok(Vec::new()))
            }
        };

        let texture_search = self.texture_recall(&request.context, limit, &now_str);

        let raw_turns = async {
            if request.mode == RecallMode::Startup {
                let capture = self.capture.clone();
                let startup_window = self.startup_window;
                tokio::task::spawn_blocking(move || capture.recent_window(startup_window))
                    .await
                    .unwrap_or(Ok(Vec::new()))
            } else {
                Ok(Vec::new())
            }
        };

        let (crystals_result, anchors_result, crystals_search_result, texture_result, raw_result) = tokio::join!(
            timeout(self.soft_deadline, crystals_recent),
            timeout(self.soft_deadline, anchors_search),
            timeout(self.soft_deadline, crystals_search),
            timeout(self.soft_deadline, texture_search),
            timeout(self.soft_deadline, raw_turns),
        );

        let mut manifest = Manifest::default();
        let mut seen_hashes: HashSet<[u8; 32]> = HashSet::new();

        let anchor_items = slice_or_timeout(anchors_result, &mut manifest.word_photos, |r| {
            r.map(|anchors| {
                anchors
                    .into_iter()
                    .map(|a| format!("[word-photo] {}: {}", a.anchor.title, a.anchor.body))
                    .collect()
            })
            .unwrap_or_default()
        });
        let anchor_items = dedup(anchor_items, &mut seen_hashes);

        let crystal_items = slice_or_timeout(crystals_result, &mut manifest.crystals, |r| {
            r.map(|summaries| summaries.into_iter().map(|s| format!("[crystal] {}", s.text)).collect())
                .unwrap_or_default()
        });
        let crystal_items = dedup(crystal_items, &mut seen_hashes);

        let texture_items = slice_or_timeout(texture_result, &mut manifest.rich_texture, |r| {
            r.map(|edges| {
                edges
                    .into_iter()
                    .map(|e| format!("[texture] {} -- {:?} -- {}: {}", e.source_name, e.predicate, e.target_name, e.fact))
                    .collect()
            })
            .unwrap_or_default()
        });
        let texture_items = dedup(texture_items, &mut seen_hashes);

        let summary_items = slice_or_timeout(crystals_search_result, &mut manifest.summaries, |r| {
            r.map(|summaries| summaries.into_iter().map(|s| format!("[summary] {}", s.text)).collect())
                .unwrap_or_default()
        });
        let summary_items = dedup(summary_items, &mut seen_hashes);

        let raw_items = slice_or_timeout(raw_result, &mut manifest.recent_turns, |r| {
            r.map(|messages| {
                messages
                    .into_iter()
                    .map(|m| format!("[{}] {}: {}", m.channel, m.author_name, m.content))
                    .collect()
            })
            .unwrap_or_default()
        });
        let raw_items = dedup(raw_items, &mut seen_hashes);

        // Preference order for the budget: anchors, crystals, texture,
        // summaries, raw turns.
        let mut remaining = request.budget_chars;
        let (anchor_items, used) = fit_budget(anchor_items, remaining);
        manifest.word_photos.items = anchor_items.len();
        manifest.word_photos.chars = used;
        remaining = remaining.saturating_sub(used);

        let (crystal_items, used) = fit_budget(crystal_items, remaining);
        manifest.crystals.items = crystal_items.len();
        manifest.crystals.chars = used;
        remaining = remaining.saturating_sub(used);

        let (texture_items, used) = fit_budget(texture_items, remaining);
        manifest.rich_texture.items = texture_items.len();
        manifest.rich_texture.chars = used;
        remaining = remaining.saturating_sub(used);

        let (summary_items, used) = fit_budget(summary_items, remaining);
        manifest.summaries.items = summary_items.len();
        manifest.summaries.chars = used;
        remaining = remaining.saturating_sub(used);

        let (raw_items, used) = fit_budget(raw_items, remaining);
        manifest.recent_turns.items = raw_items.len();
        manifest.recent_turns.chars = used;

        manifest.total_chars = manifest.word_photos.chars
            + manifest.crystals.chars
            + manifest.rich_texture.chars
            + manifest.summaries.chars
            + manifest.recent_turns.chars;

        let hour = now.hour();
        let clock = ClockBlock {
            timestamp: now_str.clone(),
            display: now.format("%Y-%m-%d %H:%M UTC").to_string(),
            hour,
            note: time_of_day_note(hour).to_string(),
        };

        let counts = self.counts();
        let memory_health = format!(
            "{} unsummarized, {} unungested",
            counts.unsummarized, counts.unungested
        );

        let formatted_context = format_context(&clock, &memory_health, &anchor_items, &texture_items, &crystal_items, &summary_items, &raw_items);

        RecallPackage {
            clock,
            memory_health,
            counts,
            manifest,
            formatted_context,
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        }
    }

    async fn texture_recall(&self, context: &str, limit: usize, now_str: &str) -> anamnesis_texture::Result<Vec<anamnesis_texture::ScoredEdge>> {
        match self.primary_cache.resolve(&self.texture, &self.primary_entity_name).await? {
            Some(uuid) => {
                anamnesis_texture::edge_hybrid_search_node_distance(&self.texture, &uuid, 2, limit, now_str).await
            }
            None => {
                warn!(primary_entity_name = %self.primary_entity_name, "primary entity not yet resolved; skipping texture recall");
                Ok(Vec::new())
            }
        }
    }

    fn counts(&self) -> RecallCounts {
        RecallCounts {
            unsummarized: self.capture.count_unsummarized().unwrap_or(0),
            unungested: self.capture.count_unungested().unwrap_or(0),
        }
    }
}

fn slice_or_timeout<T, E>(
    result: Result<Result<T, E>, tokio::time::error::Elapsed>,
    layer: &mut ManifestLayer,
    into_items: impl FnOnce(Result<T, E>) -> Vec<String>,
) -> Vec<String> {
    match result {
        Ok(inner) => into_items(inner),
        Err(_) => {
            layer.timeout = Some(true);
            Vec::new()
        }
    }
}

fn dedup(items: Vec<String>, seen: &mut HashSet<[u8; 32]>) -> Vec<String> {
    items
        .into_iter()
        .filter(|item| {
            let hash: [u8; 32] = Sha256::digest(item.as_bytes()).into();
            seen.insert(hash)
        })
        .collect()
}

fn format_context(
    clock: &ClockBlock,
    memory_health: &str,
    anchors: &[String],
    texture: &[String],
    crystals: &[String],
    summaries: &[String],
    raw_turns: &[String],
) -> String {
    let mut sections = Vec::new();
    sections.push(format!("## Clock\n{} ({})", clock.display, clock.note));
    sections.push(format!("## Memory health\n{memory_health}"));
    if !anchors.is_empty() {
        sections.push(format!("## Anchors\n{}", anchors.join("\n")));
    }
    if !texture.is_empty() {
        sections.push(format!("## Rich texture\n{}", texture.join("\n")));
    }
    if !crystals.is_empty() || !summaries.is_empty() {
        let mut all = crystals.to_vec();
        all.extend(summaries.iter().cloned());
        sections.push(format!("## Summaries\n{}", all.join("\n")));
    }
    if !raw_turns.is_empty() {
        sections.push(format!("## Recent turns\n{}", raw_turns.join("\n")));
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anamnesis_anchors::{AnchorStore, EmbeddingClient};
    use anamnesis_capture::CaptureStore;
    use anamnesis_crystals::CrystalStore;
    use async_trait::async_trait;
    use rusqlite::Connection;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    struct NullEmbedder;

    #[async_trait]
    impl EmbeddingClient for NullEmbedder {
        async fn embed(&self, _text: &str) -> anamnesis_anchors::Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        fn model_name(&self) -> &str {
            "null"
        }
    }

    async fn composer(primary_entity_name: &str) -> Composer {
        let capture_conn = Connection::open_in_memory().unwrap();
        anamnesis_capture::db::init_db(&capture_conn).unwrap();
        let capture = Arc::new(CaptureStore::new(capture_conn));

        let crystals_conn = Connection::open_in_memory().unwrap();
        anamnesis_crystals::db::init_db(&crystals_conn).unwrap();
        let crystals = Arc::new(CrystalStore::new(crystals_conn));

        let anchors_conn = Connection::open_in_memory().unwrap();
        anamnesis_anchors::db::init_db(&anchors_conn).unwrap();
        let anchors = Arc::new(AnchorStore::new(anchors_conn, Box::new(NullEmbedder)));

        let texture = Arc::new(TextureStore::connect("mem://", "test", "test").await.unwrap());

        Composer::new(
            capture,
            anchors,
            texture,
            crystals,
            Arc::new(FixedClock(Utc::now())),
            primary_entity_name.to_string(),
            500,
            20,
        )
    }

    // S4: with the primary entity never resolved (standing in for a graph
    // backend that cannot answer), ambient_recall still returns a usable
    // package instead of failing the whole request.
    #[tokio::test]
    async fn ambient_recall_degrades_gracefully_without_texture_results() {
        let composer = composer("nobody-by-this-name").await;
        let package = composer
            .ambient_recall(RecallRequest {
                context: "test".to_string(),
                limit_per_layer: 5,
                budget_chars: 50_000,
                mode: RecallMode::Normal,
            })
            .await;

        assert_eq!(package.manifest.rich_texture.items, 0);
        assert!(package.latency_ms <= 1000.0);
    }

    #[tokio::test]
    async fn ambient_recall_with_zero_limit_returns_only_clock_and_health() {
        let composer = composer("primary").await;
        let package = composer
            .ambient_recall(RecallRequest {
                context: "test".to_string(),
                limit_per_layer: 0,
                budget_chars: 50_000,
                mode: RecallMode::Normal,
            })
            .await;

        assert_eq!(package.manifest.word_photos.items, 0);
        assert_eq!(package.manifest.crystals.items, 0);
        assert_eq!(package.manifest.rich_texture.items, 0);
        assert_eq!(package.manifest.summaries.items, 0);
        assert_eq!(package.manifest.recent_turns.items, 0);
        assert!(!package.clock.display.is_empty());
        assert!(!package.memory_health.is_empty());
    }
}
