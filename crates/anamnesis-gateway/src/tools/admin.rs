use std::sync::Arc;

use serde_json::Value;

use anamnesis_core::error::Result;
use anamnesis_texture::{dedup, IngestionStats};

use crate::state::AppState;
use crate::tools::req_str_vec;

pub async fn ingest_batch_to_graphiti(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let outcome = state.ingestion.tick().await?;
    Ok(serde_json::to_value(outcome).unwrap())
}

pub async fn graphiti_ingestion_stats(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let (entities, edges) = state.texture.graph_counts().await?;
    let (succeeded, sentinel) = state.capture.ingestion_counts()?;
    let stats = IngestionStats {
        entities,
        edges,
        episodes_ingested: succeeded as usize,
        sentinel_messages: sentinel as usize,
    };
    Ok(serde_json::to_value(stats).unwrap())
}

pub async fn pps_health(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let health = state.health.check().await;
    Ok(serde_json::to_value(health).unwrap())
}

pub async fn summary_stats(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let stats = state.crystals.stats()?;
    Ok(serde_json::to_value(stats).unwrap())
}

/// Dry-run preview of what a dedup pass over the given entity names would
/// merge, without writing anything. The live merge only ever runs from the
/// ingestion tick; this lets an operator inspect a candidate merge first.
pub async fn dedup_preview(state: Arc<AppState>, args: Value) -> Result<Value> {
    let names = req_str_vec(&args, "names")?;
    let groups = dedup::scan(&state.texture, &names, state.config.texture.dedup_threshold).await?;

    let mut previews = Vec::with_capacity(groups.len());
    for group in &groups {
        let outcome = dedup::merge_group(&state.texture, group, true).await?;
        previews.push(serde_json::json!({
            "name": group.name,
            "group_size": group.nodes.len(),
            "would_keep": outcome.kept,
            "would_remove": outcome.removed,
        }));
    }
    Ok(serde_json::json!({ "groups": previews }))
}
