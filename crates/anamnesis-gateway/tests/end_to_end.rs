//! End-to-end coverage driven through the same tool registry the HTTP and
//! stdio transports dispatch against, rather than through either transport
//! itself — closest to the teacher's own `wire_compat.rs`-style "call the
//! public API directly" integration tests.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use anamnesis_anchors::{AnchorStore, EmbeddingClient};
use anamnesis_capture::{AuthorRole, CaptureStore};
use anamnesis_core::clock::SystemClock;
use anamnesis_core::config::AnamnesisConfig;
use anamnesis_crystals::CrystalStore;
use anamnesis_health::HealthAggregator;
use anamnesis_ingest::{BatchStore, CompletionsProvider, IngestionController};
use anamnesis_inventory::InventoryStore;
use anamnesis_recall::Composer;
use anamnesis_texture::TextureStore;
use anamnesis_gateway::state::AppState;
use anamnesis_gateway::tools::registry;

/// Character-frequency embedding, the same trick `anamnesis-anchors`' own
/// test fixture uses: deterministic and similarity-ordered without a
/// network call.
struct FakeEmbedder;

#[async_trait]
impl EmbeddingClient for FakeEmbedder {
    async fn embed(&self, text: &str) -> anamnesis_anchors::Result<Vec<f32>> {
        let mut v = vec![0.0f32; 4];
        for c in text.to_lowercase().chars() {
            match c {
                'a' => v[0] += 1.0,
                'e' => v[1] += 1.0,
                'i' => v[2] += 1.0,
                'o' => v[3] += 1.0,
                _ => {}
            }
        }
        Ok(v)
    }

    fn model_name(&self) -> &str {
        "fake-v1"
    }
}

/// A completions provider that returns a canned extraction/summarization
/// response keyed off a substring of the prompt it was handed — good
/// enough since `extraction::build_prompt` embeds the episode body
/// verbatim, and `summarize_request`'s prompt embeds the transcript.
struct ScriptedCompletions {
    scripts: Vec<(&'static str, &'static str)>,
    fallback: &'static str,
}

#[async_trait]
impl CompletionsProvider for ScriptedCompletions {
    async fn complete(&self, prompt: &str) -> anamnesis_ingest::Result<String> {
        for (needle, response) in &self.scripts {
            if prompt.contains(needle) {
                return Ok((*response).to_string());
            }
        }
        Ok(self.fallback.to_string())
    }
}

fn empty_extraction() -> &'static str {
    r#"{"entities": [], "edges": []}"#
}

async fn build_state(db_path: &Path, anchors_dir: &Path, completions: Arc<dyn CompletionsProvider>) -> Arc<AppState> {
    let capture_conn = rusqlite::Connection::open(db_path).unwrap();
    anamnesis_capture::db::init_db(&capture_conn).unwrap();
    let capture = Arc::new(CaptureStore::new(capture_conn));

    let crystals_conn = rusqlite::Connection::open(db_path).unwrap();
    anamnesis_crystals::db::init_db(&crystals_conn).unwrap();
    let crystals = Arc::new(CrystalStore::new(crystals_conn));

    let inventory_conn = rusqlite::Connection::open(db_path).unwrap();
    anamnesis_inventory::db::init_db(&inventory_conn).unwrap();
    let inventory = Arc::new(InventoryStore::new(inventory_conn));

    let anchors_conn = rusqlite::Connection::open(db_path).unwrap();
    anamnesis_anchors::db::init_db(&anchors_conn).unwrap();
    let anchors = Arc::new(AnchorStore::new(anchors_conn, Box::new(FakeEmbedder)));

    let texture = Arc::new(TextureStore::connect("mem://", "test", "test").await.unwrap());

    let batches_conn = rusqlite::Connection::open(db_path).unwrap();
    anamnesis_ingest::db::init_db(&batches_conn).unwrap();
    let batches = BatchStore::new(batches_conn);

    let mut config = AnamnesisConfig::default();
    config.database.path = db_path.to_string_lossy().to_string();
    config.anchors.directory = anchors_dir.to_string_lossy().to_string();

    let health = Arc::new(HealthAggregator::new(
        capture.clone(),
        anchors_dir.to_path_buf(),
        texture.clone(),
        crystals.clone(),
        inventory.clone(),
    ));

    let composer = Arc::new(Composer::new(
        capture.clone(),
        anchors.clone(),
        texture.clone(),
        crystals.clone(),
        Arc::new(SystemClock),
        "primary".to_string(),
        config.recall.soft_deadline_ms,
        config.recall.startup_window,
    ));

    let ingestion = Arc::new(IngestionController::new(
        capture.clone(),
        texture.clone(),
        crystals.clone(),
        batches,
        completions.clone(),
        config.ingest.clone(),
        config.texture.dedup_threshold,
    ));

    Arc::new(AppState {
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

async fn call(state: &Arc<AppState>, name: &str, args: Value) -> Value {
    let tool = registry()
        .into_iter()
        .find(|t| t.name == name)
        .unwrap_or_else(|| panic!("no such tool registered: {name}"));
    (tool.handler)(state.clone(), args)
        .await
        .unwrap_or_else(|e| panic!("tool {name} failed: {e}"))
}

fn noop_completions() -> Arc<dyn CompletionsProvider> {
    Arc::new(ScriptedCompletions {
        scripts: vec![],
        fallback: empty_extraction(),
    })
}

/// S1: capture, summarize, recall. A full channel's worth of turns gets
/// summarized and the summary is retrievable by kind, with the backlog
/// drained afterward.
#[tokio::test]
async fn s1_capture_summarize_and_recall() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");
    let state = build_state(&db_path, &anchors_dir, noop_completions()).await;

    for i in 0..50 {
        let (role, author) = if i % 2 == 0 {
            (AuthorRole::User, "alice")
        } else {
            (AuthorRole::Assistant, "assistant")
        };
        state
            .capture
            .append("c1", author, role, &format!("turn {i}"), &format!("2026-01-01T00:00:{i:02}Z"), false)
            .unwrap();
    }

    let request = call(&state, "summarize_messages", json!({"kind": "work", "max_messages": 50})).await;
    let start = request["message_range"][0].as_i64().unwrap();
    let end = request["message_range"][1].as_i64().unwrap();
    assert_eq!((start, end), (1, 50));
    let channels: Vec<String> = request["channels"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert_eq!(channels, vec!["c1".to_string()]);

    call(
        &state,
        "store_summary",
        json!({
            "text": "S1",
            "start_message_id": start,
            "end_message_id": end,
            "channels": channels,
            "kind": "work",
        }),
    )
    .await;

    let recent = call(&state, "get_recent_summaries", json!({"limit": 1})).await;
    let summaries = recent.as_array().unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0]["text"], "S1");
    assert_eq!(summaries[0]["start_message_id"], 1);
    assert_eq!(summaries[0]["end_message_id"], 50);

    assert_eq!(state.capture.count_unsummarized().unwrap(), 0);
}

/// S2: ingestion drain and texture query. Two distinct facts land as
/// distinct edges once the controller drains the backlog.
#[tokio::test]
async fn s2_ingestion_drain_and_texture_query() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");

    let completions: Arc<dyn CompletionsProvider> = Arc::new(ScriptedCompletions {
        scripts: vec![
            (
                "Alice likes Bob",
                r#"{"entities": [
                    {"name": "Alice", "types": ["person"], "summary": "a person"},
                    {"name": "Bob", "types": ["person"], "summary": "a person"}
                ], "edges": [
                    {"source_name": "Alice", "target_name": "Bob", "predicate": "knows", "fact": "Alice likes Bob"}
                ]}"#,
            ),
            (
                "Alice works on Project-X",
                r#"{"entities": [
                    {"name": "Alice", "types": ["person"], "summary": "a person"},
                    {"name": "Project-X", "types": ["technical_artifact"], "summary": "a project"}
                ], "edges": [
                    {"source_name": "Alice", "target_name": "Project-X", "predicate": "works_on", "fact": "Alice works on Project-X"}
                ]}"#,
            ),
        ],
        fallback: empty_extraction(),
    });

    let state = build_state(&db_path, &anchors_dir, completions).await;

    state
        .capture
        .append("c1", "alice", AuthorRole::User, "Alice likes Bob", "2026-01-01T00:00:00Z", false)
        .unwrap();
    state
        .capture
        .append("c1", "alice", AuthorRole::User, "Alice works on Project-X", "2026-01-01T00:00:01Z", false)
        .unwrap();

    state.ingestion.tick().await.unwrap();
    assert_eq!(state.capture.count_unungested().unwrap(), 0);

    let search = call(&state, "texture_search", json!({"query": "Alice", "limit": 10})).await;
    let edges = search.as_array().unwrap();
    assert!(edges.iter().any(|e| e["source_name"] == "Alice" && e["target_name"] == "Bob"));
    assert!(edges.iter().any(|e| e["source_name"] == "Alice" && e["target_name"] == "Project-X"));

    let alice = state.texture.find_entity_by_name("Alice", &[]).await.unwrap().unwrap();
    let explore = call(
        &state,
        "texture_search",
        json!({"center_entity_uuid": alice.uuid.as_str(), "limit": 10}),
    )
    .await;
    let neighbors: Vec<String> = explore
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|e| [e["source_name"].as_str().unwrap().to_string(), e["target_name"].as_str().unwrap().to_string()])
        .collect();
    assert!(neighbors.contains(&"Bob".to_string()));
    assert!(neighbors.contains(&"Project-X".to_string()));
}

/// S3: dedup self-heal. Concurrent writers racing the same canonical
/// entity can leave more than one node behind; a dedup pass over the
/// touched name always leaves no more than one standing afterward.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn s3_dedup_self_heal_leaves_one_canonical_node() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");
    let state = build_state(&db_path, &anchors_dir, noop_completions()).await;

    let mut writers = Vec::new();
    for _ in 0..10 {
        let texture = state.texture.clone();
        writers.push(tokio::spawn(async move {
            texture
                .upsert_entity("Alice", vec![anamnesis_texture::EntityType::Person], "a person", "2026-01-01T00:00:00Z")
                .await
                .unwrap();
        }));
    }
    for w in writers {
        w.await.unwrap();
    }

    let before = state.texture.find_entities_by_name("Alice", &[]).await.unwrap();
    let pre_edge_counts: Vec<usize> = {
        let mut counts = Vec::new();
        for node in &before {
            counts.push(state.texture.edge_count(&node.uuid).await.unwrap());
        }
        counts
    };
    let max_pre_edges = pre_edge_counts.into_iter().max().unwrap_or(0);

    let groups = anamnesis_texture::dedup::scan(&state.texture, &["Alice".to_string()], 2).await.unwrap();
    for group in &groups {
        anamnesis_texture::dedup::merge_group(&state.texture, group, false).await.unwrap();
    }

    let after = state.texture.find_entities_by_name("Alice", &[]).await.unwrap();
    assert_eq!(after.len(), 1, "dedup must leave exactly one canonical node standing");
    let surviving_edges = state.texture.edge_count(&after[0].uuid).await.unwrap();
    assert!(surviving_edges >= max_pre_edges);
}

/// S4: composer degrades gracefully when the graph backend has nothing
/// to answer with (standing in for "kill the graph backend" — a primary
/// entity that was never resolved behaves identically from the
/// composer's point of view, since `texture_recall` never got a uuid to
/// query with either way).
#[tokio::test]
async fn s4_ambient_recall_survives_a_dead_graph_layer() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");
    let state = build_state(&db_path, &anchors_dir, noop_completions()).await;

    let package = call(
        &state,
        "ambient_recall",
        json!({"context": "test", "limit_per_layer": 5, "budget_chars": 50000, "mode": "normal"}),
    )
    .await;

    assert_eq!(package["manifest"]["rich_texture"]["items"], 0);
    let soft_deadline = state.config.recall.soft_deadline_ms as f64;
    assert!(package["latency_ms"].as_f64().unwrap() <= soft_deadline * 2.0);
    assert!(!package["formatted_context"].as_str().unwrap().is_empty());
}

/// S5: multi-channel ordering. `get_turns_around` orders strictly by id
/// regardless of how channels interleave.
#[tokio::test]
async fn s5_multi_channel_ordering() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");
    let state = build_state(&db_path, &anchors_dir, noop_completions()).await;

    let channels = ["c1", "c2", "c3"];
    let mut ids = Vec::new();
    for i in 0..20 {
        let channel = channels[i % channels.len()];
        let id = state
            .capture
            .append(channel, "a", AuthorRole::User, &format!("m{i}"), &format!("2026-01-01T00:00:{i:02}Z"), false)
            .unwrap();
        ids.push(id);
    }

    let center = ids[10];
    let window = call(&state, "get_turns_around", json!({"id": center, "before": 5, "after": 5})).await;
    let returned_ids: Vec<i64> = window.as_array().unwrap().iter().map(|m| m["id"].as_i64().unwrap()).collect();

    assert_eq!(returned_ids.len(), 11);
    let mut sorted = returned_ids.clone();
    sorted.sort();
    assert_eq!(returned_ids, sorted, "window must already be in strict id order");
    assert_eq!(returned_ids, (center - 5..=center + 5).collect::<Vec<_>>());
}

/// S6: anchor resync round-trip — add, update, delete, prune, each
/// reflected in the report and in what `anchor_search` can find.
#[tokio::test]
async fn s6_anchor_resync_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("anamnesis.db");
    let anchors_dir = tmp.path().join("anchors");
    std::fs::create_dir_all(&anchors_dir).unwrap();
    let state = build_state(&db_path, &anchors_dir, noop_completions()).await;

    std::fs::write(anchors_dir.join("one.md"), "# One\n\naaaa").unwrap();
    std::fs::write(anchors_dir.join("two.md"), "# Two\n\neeee").unwrap();

    let report = call(&state, "anchor_resync", json!({"prune": false})).await;
    assert_eq!(report["added"], 2);

    std::fs::write(anchors_dir.join("one.md"), "# One\n\naaaaoo").unwrap();
    let report = call(&state, "anchor_resync", json!({"prune": false})).await;
    assert_eq!(report["updated"], 1);

    std::fs::remove_file(anchors_dir.join("two.md")).unwrap();
    let report = call(&state, "anchor_resync", json!({"prune": true})).await;
    assert_eq!(report["removed"], 1);

    let results = call(&state, "anchor_search", json!({"query": "", "limit": 10})).await;
    assert_eq!(results.as_array().unwrap().len(), 1);
}
