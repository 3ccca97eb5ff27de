use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use anamnesis_core::error::Result;
use anamnesis_core::ids::EntityUuid;
use anamnesis_core::ApiError;
use anamnesis_recall::RecallRequest;
use anamnesis_texture::search;

use crate::state::AppState;
use crate::tools::{opt_str, opt_usize, req_i64, req_str};

pub async fn ambient_recall(state: Arc<AppState>, args: Value) -> Result<Value> {
    let request: RecallRequest = serde_json::from_value(args)
        .map_err(|e| ApiError::input_shape(format!("invalid ambient_recall request: {e}")))?;
    let package = state.composer.ambient_recall(request).await;
    Ok(serde_json::to_value(package).unwrap())
}

pub async fn anchor_search(state: Arc<AppState>, args: Value) -> Result<Value> {
    let query = req_str(&args, "query")?;
    let limit = opt_usize(&args, "limit", 5);
    let results = state.anchors.search(query, limit).await?;
    Ok(serde_json::to_value(results).unwrap())
}

pub async fn raw_search(state: Arc<AppState>, args: Value) -> Result<Value> {
    let query = req_str(&args, "query")?;
    let limit = opt_usize(&args, "limit", 20);
    let channel = opt_str(&args, "channel");
    let since = opt_str(&args, "since");
    let until = opt_str(&args, "until");
    let results = state.capture.fts_search(query, limit, channel, since, until)?;
    Ok(serde_json::to_value(results).unwrap())
}

async fn resolve_entity(state: &Arc<AppState>, args: &Value) -> Result<EntityUuid> {
    if let Some(uuid) = opt_str(args, "entity_uuid") {
        return Ok(EntityUuid::from(uuid.to_string()));
    }
    let name = opt_str(args, "entity_name")
        .ok_or_else(|| ApiError::input_shape("one of entity_uuid or entity_name is required"))?;
    let node = state
        .texture
        .find_entity_by_name(name, &[])
        .await?
        .ok_or_else(|| ApiError::not_found(format!("entity '{name}' not found")))?;
    Ok(node.uuid)
}

pub async fn texture_search(state: Arc<AppState>, args: Value) -> Result<Value> {
    let limit = opt_usize(&args, "limit", 10);
    let now = Utc::now().to_rfc3339();
    let query = opt_str(&args, "query").unwrap_or("");

    let results = if let Some(uuid) = opt_str(&args, "center_entity_uuid") {
        let origin = EntityUuid::from(uuid.to_string());
        search::edge_hybrid_search_node_distance(&state.texture, &origin, 2, limit, &now).await?
    } else {
        search::edge_hybrid_search_rrf(&state.texture, query, limit, &now).await?
    };
    Ok(serde_json::to_value(results).unwrap())
}

pub async fn texture_explore(state: Arc<AppState>, args: Value) -> Result<Value> {
    let uuid = resolve_entity(&state, &args).await?;
    let now = Utc::now().to_rfc3339();
    let edges = state.texture.current_edges_for(&uuid, &now).await?;
    Ok(serde_json::to_value(edges).unwrap())
}

pub async fn texture_timeline(state: Arc<AppState>, args: Value) -> Result<Value> {
    let uuid = resolve_entity(&state, &args).await?;
    let now = Utc::now().to_rfc3339();
    let edges = search::timeline(&state.texture, &uuid, &now).await?;
    Ok(serde_json::to_value(edges).unwrap())
}

pub async fn get_crystals(state: Arc<AppState>, args: Value) -> Result<Value> {
    let limit = opt_usize(&args, "limit", 5);
    let kind = opt_str(&args, "kind")
        .map(|k| serde_json::from_value(Value::String(k.to_string())))
        .transpose()
        .map_err(|e: serde_json::Error| ApiError::input_shape(e.to_string()))?;
    let summaries = state.crystals.recent(limit, kind)?;
    Ok(serde_json::to_value(summaries).unwrap())
}

pub async fn get_recent_summaries(state: Arc<AppState>, args: Value) -> Result<Value> {
    let limit = opt_usize(&args, "limit", 5);
    let summaries = state.crystals.recent(limit, None)?;
    Ok(serde_json::to_value(summaries).unwrap())
}

pub async fn search_summaries(state: Arc<AppState>, args: Value) -> Result<Value> {
    let query = req_str(&args, "query")?;
    let limit = opt_usize(&args, "limit", 5);
    let summaries = state.crystals.search(query, limit)?;
    Ok(serde_json::to_value(summaries).unwrap())
}

pub async fn get_turns_since_summary(state: Arc<AppState>, args: Value) -> Result<Value> {
    let max = opt_usize(&args, "max", 200);
    let messages = state.capture.select_unsummarized(max)?;
    Ok(serde_json::to_value(messages).unwrap())
}

pub async fn get_turns_around(state: Arc<AppState>, args: Value) -> Result<Value> {
    let id = req_i64(&args, "id")?;
    let before = opt_usize(&args, "before", 5);
    let after = opt_usize(&args, "after", 5);
    let messages = state.capture.window_around(id, before, after)?;
    Ok(serde_json::to_value(messages).unwrap())
}

pub async fn get_conversation_context(state: Arc<AppState>, args: Value) -> Result<Value> {
    let limit = opt_usize(&args, "limit", 20);
    let messages = state.capture.recent_window(limit)?;
    Ok(serde_json::to_value(messages).unwrap())
}
