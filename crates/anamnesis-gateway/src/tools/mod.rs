//! Flat tool registry. Every entry is `{name, description, input_schema,
//! handler}`, driving both the Axum router (`/tools/<name>`) and the stdio
//! JSON-RPC loop from the same table, so a new tool is wired up in exactly
//! one place.

mod admin;
mod inventory;
mod retrieval;
mod storage;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use anamnesis_core::error::Result;

use crate::state::AppState;

pub type ToolHandler =
    fn(Arc<AppState>, Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub handler: ToolHandler,
}

macro_rules! tool {
    ($name:expr, $description:expr, $schema:expr, $handler:path) => {
        ToolDef {
            name: $name,
            description: $description,
            input_schema: $schema,
            handler: |state, args| Box::pin($handler(state, args)),
        }
    };
}

pub fn registry() -> Vec<ToolDef> {
    vec![
        // Memory retrieval
        tool!(
            "ambient_recall",
            "Fan out across every memory layer for the current context and return a budgeted, formatted recall package.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "context": {"type": "string"},
                    "limit_per_layer": {"type": "integer", "default": 5},
                    "budget_chars": {"type": "integer", "default": 50000},
                    "mode": {"type": "string", "enum": ["startup", "normal"], "default": "normal"}
                },
                "required": ["context"]
            }),
            retrieval::ambient_recall
        ),
        tool!(
            "anchor_search",
            "Embedding-similarity search over curated word-photo anchors.",
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer", "default": 5}},
                "required": ["query"]
            }),
            retrieval::anchor_search
        ),
        tool!(
            "raw_search",
            "Full-text search over the raw capture log.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "default": 20},
                    "channel": {"type": "string"},
                    "since": {"type": "string"},
                    "until": {"type": "string"}
                },
                "required": ["query"]
            }),
            retrieval::raw_search
        ),
        tool!(
            "texture_search",
            "Hybrid search over the relationship graph. With center_entity_uuid, ranks by node distance; otherwise falls back to text+recency RRF.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "default": ""},
                    "center_entity_uuid": {"type": "string"},
                    "limit": {"type": "integer", "default": 10}
                }
            }),
            retrieval::texture_search
        ),
        tool!(
            "texture_explore",
            "Every current edge touching a named or identified entity.",
            serde_json::json!({
                "type": "object",
                "properties": {"entity_uuid": {"type": "string"}, "entity_name": {"type": "string"}}
            }),
            retrieval::texture_explore
        ),
        tool!(
            "texture_timeline",
            "Current edges for an entity, oldest first.",
            serde_json::json!({
                "type": "object",
                "properties": {"entity_uuid": {"type": "string"}, "entity_name": {"type": "string"}}
            }),
            retrieval::texture_timeline
        ),
        tool!(
            "get_crystals",
            "Most recent rolling summaries (crystals), optionally filtered by kind.",
            serde_json::json!({
                "type": "object",
                "properties": {"limit": {"type": "integer", "default": 5}, "kind": {"type": "string", "enum": ["work", "reflection", "mixed"]}}
            }),
            retrieval::get_crystals
        ),
        tool!(
            "get_recent_summaries",
            "Most recent summaries across all kinds.",
            serde_json::json!({"type": "object", "properties": {"limit": {"type": "integer", "default": 5}}}),
            retrieval::get_recent_summaries
        ),
        tool!(
            "search_summaries",
            "Full-text search over stored summaries.",
            serde_json::json!({
                "type": "object",
                "properties": {"query": {"type": "string"}, "limit": {"type": "integer", "default": 5}},
                "required": ["query"]
            }),
            retrieval::search_summaries
        ),
        tool!(
            "get_turns_since_summary",
            "Messages captured since the last summarization point.",
            serde_json::json!({"type": "object", "properties": {"max": {"type": "integer", "default": 200}}}),
            retrieval::get_turns_since_summary
        ),
        tool!(
            "get_turns_around",
            "A window of raw turns around a given message id, in strict id order.",
            serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "integer"}, "before": {"type": "integer", "default": 5}, "after": {"type": "integer", "default": 5}},
                "required": ["id"]
            }),
            retrieval::get_turns_around
        ),
        tool!(
            "get_conversation_context",
            "The most recent raw turns across all channels.",
            serde_json::json!({"type": "object", "properties": {"limit": {"type": "integer", "default": 20}}}),
            retrieval::get_conversation_context
        ),
        // Memory storage
        tool!(
            "anchor_save",
            "Write a new word-photo anchor to disk and index it.",
            serde_json::json!({
                "type": "object",
                "properties": {"title": {"type": "string"}, "body": {"type": "string"}, "tags": {"type": "string"}},
                "required": ["title", "body"]
            }),
            storage::anchor_save
        ),
        tool!(
            "anchor_delete",
            "Delete an anchor by id, optionally removing its source file.",
            serde_json::json!({
                "type": "object",
                "properties": {"id": {"type": "string"}, "remove_file": {"type": "boolean", "default": false}},
                "required": ["id"]
            }),
            storage::anchor_delete
        ),
        tool!(
            "anchor_resync",
            "Rebuild the anchor index from the markdown directory on disk.",
            serde_json::json!({"type": "object", "properties": {"prune": {"type": "boolean", "default": false}}}),
            storage::anchor_resync
        ),
        tool!(
            "texture_add",
            "Insert or update a canonical entity node by name.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string"},
                    "types": {"type": "array", "items": {"type": "string"}},
                    "summary": {"type": "string", "default": ""}
                },
                "required": ["name", "types"]
            }),
            storage::texture_add
        ),
        tool!(
            "texture_add_triplet",
            "Upsert a subject and object entity and relate them with a predicate edge.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "subject": {"type": "string"},
                    "subject_types": {"type": "array", "items": {"type": "string"}},
                    "predicate": {"type": "string"},
                    "object": {"type": "string"},
                    "object_types": {"type": "array", "items": {"type": "string"}},
                    "fact": {"type": "string"},
                    "valid_from": {"type": "string"}
                },
                "required": ["subject", "subject_types", "predicate", "object", "object_types", "fact"]
            }),
            storage::texture_add_triplet
        ),
        tool!(
            "texture_delete",
            "Delete an entity or an edge by uuid.",
            serde_json::json!({
                "type": "object",
                "properties": {"kind": {"type": "string", "enum": ["entity", "edge"]}, "uuid": {"type": "string"}},
                "required": ["kind", "uuid"]
            }),
            storage::texture_delete
        ),
        tool!(
            "crystallize",
            "Build a summarization prompt for unsummarized messages, run it through the completions provider, and store the result.",
            serde_json::json!({
                "type": "object",
                "properties": {"kind": {"type": "string", "enum": ["work", "reflection", "mixed"], "default": "mixed"}, "max_messages": {"type": "integer", "default": 200}}
            }),
            storage::crystallize
        ),
        tool!(
            "summarize_messages",
            "Build (but do not execute) a summarization prompt for unsummarized messages.",
            serde_json::json!({
                "type": "object",
                "properties": {"kind": {"type": "string", "enum": ["work", "reflection", "mixed"], "default": "mixed"}, "max_messages": {"type": "integer", "default": 200}}
            }),
            storage::summarize_messages
        ),
        tool!(
            "store_summary",
            "Store a precomputed summary and mark the covered messages.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "start_message_id": {"type": "integer"},
                    "end_message_id": {"type": "integer"},
                    "channels": {"type": "array", "items": {"type": "string"}},
                    "kind": {"type": "string", "enum": ["work", "reflection", "mixed"]}
                },
                "required": ["text", "start_message_id", "end_message_id", "channels", "kind"]
            }),
            storage::store_summary
        ),
        // Ingestion & admin
        tool!(
            "ingest_batch_to_graphiti",
            "Drain one batch of unungested messages into the relationship graph.",
            serde_json::json!({"type": "object", "properties": {}}),
            admin::ingest_batch_to_graphiti
        ),
        tool!(
            "graphiti_ingestion_stats",
            "Entity/edge totals and ingestion outcome counts.",
            serde_json::json!({"type": "object", "properties": {}}),
            admin::graphiti_ingestion_stats
        ),
        tool!(
            "pps_health",
            "Per-layer health probes and the deterministic overall verdict.",
            serde_json::json!({"type": "object", "properties": {}}),
            admin::pps_health
        ),
        tool!(
            "summary_stats",
            "Summary counts by kind plus oldest/newest timestamps.",
            serde_json::json!({"type": "object", "properties": {}}),
            admin::summary_stats
        ),
        tool!(
            "dedup_preview",
            "Dry-run preview of the duplicate-entity groups a dedup pass over the given names would merge.",
            serde_json::json!({
                "type": "object",
                "properties": {"names": {"type": "array", "items": {"type": "string"}}},
                "required": ["names"]
            }),
            admin::dedup_preview
        ),
        // Inventory & spaces
        tool!(
            "inventory_list",
            "List inventory items in a category, optionally filtered by attribute.",
            serde_json::json!({
                "type": "object",
                "properties": {"category": {"type": "string"}, "filters": {"type": "object"}},
                "required": ["category"]
            }),
            inventory::inventory_list
        ),
        tool!(
            "inventory_add",
            "Add a new inventory item.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "name": {"type": "string"},
                    "attributes": {"type": "object"},
                    "description": {"type": "string", "default": ""},
                    "sensory_description": {"type": "string", "default": ""}
                },
                "required": ["category", "name"]
            }),
            inventory::inventory_add
        ),
        tool!(
            "inventory_get",
            "Fetch one inventory item by category and name.",
            serde_json::json!({
                "type": "object",
                "properties": {"category": {"type": "string"}, "name": {"type": "string"}},
                "required": ["category", "name"]
            }),
            inventory::inventory_get
        ),
        tool!(
            "inventory_delete",
            "Delete an inventory item by category and name.",
            serde_json::json!({
                "type": "object",
                "properties": {"category": {"type": "string"}, "name": {"type": "string"}},
                "required": ["category", "name"]
            }),
            inventory::inventory_delete
        ),
        tool!(
            "inventory_categories",
            "All distinct inventory categories.",
            serde_json::json!({"type": "object", "properties": {}}),
            inventory::inventory_categories
        ),
        tool!(
            "enter_space",
            "Fetch a space's sensory description and attributes by name.",
            serde_json::json!({"type": "object", "properties": {"name": {"type": "string"}}, "required": ["name"]}),
            inventory::enter_space
        ),
        tool!(
            "list_spaces",
            "All defined spaces.",
            serde_json::json!({"type": "object", "properties": {}}),
            inventory::list_spaces
        ),
    ]
}

pub(crate) fn req_str<'a>(args: &'a Value, field: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anamnesis_core::ApiError::input_shape(format!("missing required field: {field}")))
}

pub(crate) fn opt_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

pub(crate) fn opt_usize(args: &Value, field: &str, default: usize) -> usize {
    args.get(field)
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(default)
}

pub(crate) fn req_i64(args: &Value, field: &str) -> Result<i64> {
    args.get(field)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anamnesis_core::ApiError::input_shape(format!("missing required field: {field}")))
}

pub(crate) fn opt_i64(args: &Value, field: &str, default: i64) -> i64 {
    args.get(field).and_then(|v| v.as_i64()).unwrap_or(default)
}

pub(crate) fn req_str_vec(args: &Value, field: &str) -> Result<Vec<String>> {
    args.get(field)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .ok_or_else(|| anamnesis_core::ApiError::input_shape(format!("missing required field: {field}")))
}
