use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use anamnesis_core::error::Result;

use crate::state::AppState;
use crate::tools::req_str;

fn parse_filters(args: &Value) -> HashMap<String, String> {
    args.get("filters")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_attributes(args: &Value) -> HashMap<String, String> {
    args.get("attributes")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn inventory_list(state: Arc<AppState>, args: Value) -> Result<Value> {
    let category = req_str(&args, "category")?;
    let filters = parse_filters(&args);
    let items = state.inventory.list(category, &filters)?;
    Ok(serde_json::to_value(items).unwrap())
}

pub async fn inventory_add(state: Arc<AppState>, args: Value) -> Result<Value> {
    let category = req_str(&args, "category")?;
    let name = req_str(&args, "name")?;
    let attributes = parse_attributes(&args);
    let description = args.get("description").and_then(|v| v.as_str()).unwrap_or("");
    let sensory_description = args.get("sensory_description").and_then(|v| v.as_str()).unwrap_or("");
    state.inventory.add(category, name, attributes, description, sensory_description)?;
    Ok(serde_json::json!({ "category": category, "name": name }))
}

pub async fn inventory_get(state: Arc<AppState>, args: Value) -> Result<Value> {
    let category = req_str(&args, "category")?;
    let name = req_str(&args, "name")?;
    let item = state.inventory.get(category, name)?;
    Ok(serde_json::to_value(item).unwrap())
}

pub async fn inventory_delete(state: Arc<AppState>, args: Value) -> Result<Value> {
    let category = req_str(&args, "category")?;
    let name = req_str(&args, "name")?;
    state.inventory.delete(category, name)?;
    Ok(serde_json::json!({ "deleted": name }))
}

pub async fn inventory_categories(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let categories = state.inventory.categories()?;
    Ok(serde_json::to_value(categories).unwrap())
}

pub async fn enter_space(state: Arc<AppState>, args: Value) -> Result<Value> {
    let name = req_str(&args, "name")?;
    let entry = state.inventory.enter_space(name)?;
    Ok(serde_json::to_value(entry).unwrap())
}

pub async fn list_spaces(state: Arc<AppState>, _args: Value) -> Result<Value> {
    let spaces = state.inventory.list_spaces()?;
    Ok(serde_json::to_value(spaces).unwrap())
}
