use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use anamnesis_core::error::Result;
use anamnesis_core::ids::EntityUuid;
use anamnesis_core::ApiError;
use anamnesis_crystals::{SummaryKind, SummaryRequest};
use anamnesis_ingest::CompletionsProvider;
use anamnesis_texture::EntityType;

use crate::state::AppState;
use crate::tools::{opt_str, req_i64, req_str, req_str_vec};

pub async fn anchor_save(state: Arc<AppState>, args: Value) -> Result<Value> {
    let title = req_str(&args, "title")?;
    let body = req_str(&args, "body")?;
    let tags = opt_str(&args, "tags");
    let directory = Path::new(&state.config.anchors.directory);
    let id = state.anchors.save(directory, title, body, tags).await?;
    Ok(serde_json::json!({ "id": id }))
}

pub async fn anchor_delete(state: Arc<AppState>, args: Value) -> Result<Value> {
    let id = req_str(&args, "id")?;
    let remove_file = args.get("remove_file").and_then(|v| v.as_bool()).unwrap_or(false);
    state.anchors.delete(id, remove_file)?;
    Ok(serde_json::json!({ "deleted": id }))
}

pub async fn anchor_resync(state: Arc<AppState>, args: Value) -> Result<Value> {
    let prune = args.get("prune").and_then(|v| v.as_bool()).unwrap_or(false);
    let directory = Path::new(&state.config.anchors.directory);
    let report = state.anchors.sync(directory, prune).await?;
    Ok(serde_json::to_value(report).unwrap())
}

fn parse_entity_types(args: &Value, field: &str) -> Result<Vec<EntityType>> {
    let raw = args
        .get(field)
        .and_then(|v| v.as_array())
        .ok_or_else(|| ApiError::input_shape(format!("missing required field: {field}")))?;
    raw.iter()
        .map(|v| serde_json::from_value(v.clone()).map_err(|e| ApiError::input_shape(e.to_string())))
        .collect()
}

pub async fn texture_add(state: Arc<AppState>, args: Value) -> Result<Value> {
    let name = req_str(&args, "name")?;
    let types = parse_entity_types(&args, "types")?;
    let summary = opt_str(&args, "summary").unwrap_or("");
    let now = Utc::now().to_rfc3339();
    let node = state.texture.upsert_entity(name, types, summary, &now).await?;
    Ok(serde_json::to_value(node).unwrap())
}

pub async fn texture_add_triplet(state: Arc<AppState>, args: Value) -> Result<Value> {
    let subject = req_str(&args, "subject")?;
    let subject_types = parse_entity_types(&args, "subject_types")?;
    let object = req_str(&args, "object")?;
    let object_types = parse_entity_types(&args, "object_types")?;
    let predicate: anamnesis_texture::EdgeType = serde_json::from_value(Value::String(
        req_str(&args, "predicate")?.to_string(),
    ))
    .map_err(|e| ApiError::input_shape(e.to_string()))?;
    let fact = req_str(&args, "fact")?;
    let now = Utc::now().to_rfc3339();
    let valid_from = opt_str(&args, "valid_from").unwrap_or(&now).to_string();

    let subject_node = state.texture.upsert_entity(subject, subject_types, "", &now).await?;
    let object_node = state.texture.upsert_entity(object, object_types, "", &now).await?;
    let edge = state
        .texture
        .create_edge(&subject_node.uuid, &object_node.uuid, predicate, fact, &valid_from, &now)
        .await?;
    Ok(serde_json::to_value(edge).unwrap())
}

pub async fn texture_delete(state: Arc<AppState>, args: Value) -> Result<Value> {
    let kind = req_str(&args, "kind")?;
    let uuid = EntityUuid::from(req_str(&args, "uuid")?.to_string());
    match kind {
        "entity" => state.texture.delete_entity(&uuid).await?,
        "edge" => state.texture.delete_edge(&uuid).await?,
        other => return Err(ApiError::input_shape(format!("unknown kind: {other}"))),
    }
    Ok(serde_json::json!({ "deleted": uuid.as_str() }))
}

fn parse_kind(args: &Value) -> Result<SummaryKind> {
    let raw = opt_str(args, "kind").unwrap_or("mixed");
    raw.parse().map_err(|_| ApiError::input_shape(format!("unknown summary kind: {raw}")))
}

pub async fn summarize_messages(state: Arc<AppState>, args: Value) -> Result<Value> {
    let kind = parse_kind(&args)?;
    let max_messages = req_i64_or(&args, "max_messages", 200);
    let request = state.crystals.summarize_request(kind, max_messages)?;
    Ok(serde_json::to_value(request).unwrap())
}

pub async fn crystallize(state: Arc<AppState>, args: Value) -> Result<Value> {
    let kind = parse_kind(&args)?;
    let max_messages = req_i64_or(&args, "max_messages", 200);
    let request = state.crystals.summarize_request(kind, max_messages)?;

    let (prompt, start_id, end_id, channels) = match request {
        SummaryRequest::Ready { prompt, message_range, channels } => (prompt, message_range.0, message_range.1, channels),
        other => return Ok(serde_json::to_value(other).unwrap()),
    };

    let text = state
        .completions
        .complete(&prompt)
        .await
        .map_err(|e| ApiError::dependency_down(e.to_string()))?;

    let now = Utc::now().to_rfc3339();
    let summary_id = state.crystals.store_summary(&text, start_id, end_id, &channels, kind, &now)?;

    Ok(serde_json::json!({ "summary_id": summary_id, "text": text, "start_message_id": start_id, "end_message_id": end_id }))
}

pub async fn store_summary(state: Arc<AppState>, args: Value) -> Result<Value> {
    let text = req_str(&args, "text")?;
    let start_id = req_i64(&args, "start_message_id")?;
    let end_id = req_i64(&args, "end_message_id")?;
    let channels = req_str_vec(&args, "channels")?;
    let kind = parse_kind(&args)?;
    let now = Utc::now().to_rfc3339();
    let summary_id = state.crystals.store_summary(text, start_id, end_id, &channels, kind, &now)?;
    Ok(serde_json::json!({ "summary_id": summary_id }))
}

fn req_i64_or(args: &Value, field: &str, default: i64) -> i64 {
    args.get(field).and_then(|v| v.as_i64()).unwrap_or(default)
}
