use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SPACE_CATEGORY: &str = "space";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub category: String,
    pub name: String,
    pub attributes: HashMap<String, String>,
    pub description: String,
    /// Only meaningful for `category == "space"`; empty otherwise.
    pub sensory_description: String,
}

/// What `enter_space` hands back to ground the agent in its location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceEntry {
    pub name: String,
    pub sensory_description: String,
    pub attributes: HashMap<String, String>,
}
