use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::instrument;

use crate::error::{InventoryError, Result};
use crate::types::{InventoryItem, SpaceEntry, SPACE_CATEGORY};

/// Plain CRUD manager over a categorical key-value store — no FTS, no
/// cache, since inventory items are small in number and read by exact
/// (category, name) lookup or category listing, never free-text search.
pub struct InventoryStore {
    db: Mutex<Connection>,
}

impl InventoryStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    #[instrument(skip(self, attributes, description, sensory_description))]
    pub fn add(
        &self,
        category: &str,
        name: &str,
        attributes: HashMap<String, String>,
        description: &str,
        sensory_description: &str,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let attrs_json = serde_json::to_string(&attributes).unwrap_or_else(|_| "{}".to_string());
        let inserted = db
            .execute(
                "INSERT INTO inventory_items (category, name, attributes, description, sensory_description)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(category, name) DO NOTHING",
                params![category, name, attrs_json, description, sensory_description],
            )?;
        if inserted == 0 {
            return Err(InventoryError::AlreadyExists {
                category: category.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get(&self, category: &str, name: &str) -> Result<InventoryItem> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT category, name, attributes, description, sensory_description
             FROM inventory_items WHERE category = ?1 AND name = ?2",
            params![category, name],
            row_to_item,
        )
        .optional()?
        .ok_or_else(|| InventoryError::NotFound {
            category: category.to_string(),
            name: name.to_string(),
        })
    }

    #[instrument(skip(self, filters))]
    pub fn list(&self, category: &str, filters: &HashMap<String, String>) -> Result<Vec<InventoryItem>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT category, name, attributes, description, sensory_description
             FROM inventory_items WHERE category = ?1 ORDER BY name ASC",
        )?;
        let items: Vec<InventoryItem> = stmt
            .query_map(params![category], row_to_item)?
            .filter_map(|r| r.ok())
            .filter(|item| {
                filters
                    .iter()
                    .all(|(k, v)| item.attributes.get(k).map(|actual| actual == v).unwrap_or(false))
            })
            .collect();
        Ok(items)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, category: &str, name: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM inventory_items WHERE category = ?1 AND name = ?2",
            params![category, name],
        )?;
        if deleted == 0 {
            return Err(InventoryError::NotFound {
                category: category.to_string(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn categories(&self) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT DISTINCT category FROM inventory_items ORDER BY category ASC")?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r: rusqlite::Result<String>| r.ok())
            .collect();
        Ok(categories)
    }

    #[instrument(skip(self))]
    pub fn enter_space(&self, name: &str) -> Result<SpaceEntry> {
        let item = self.get(SPACE_CATEGORY, name)?;
        Ok(SpaceEntry {
            name: item.name,
            sensory_description: item.sensory_description,
            attributes: item.attributes,
        })
    }

    #[instrument(skip(self))]
    pub fn list_spaces(&self) -> Result<Vec<SpaceEntry>> {
        let items = self.list(SPACE_CATEGORY, &HashMap::new())?;
        Ok(items
            .into_iter()
            .map(|item| SpaceEntry {
                name: item.name,
                sensory_description: item.sensory_description,
                attributes: item.attributes,
            })
            .collect())
    }

    /// Cheap liveness probe for the health aggregator.
    #[instrument(skip(self))]
    pub fn health_check(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<InventoryItem> {
    let attrs_json: String = row.get(2)?;
    Ok(InventoryItem {
        category: row.get(0)?,
        name: row.get(1)?,
        attributes: serde_json::from_str(&attrs_json).unwrap_or_default(),
        description: row.get(3)?,
        sensory_description: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InventoryStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        InventoryStore::new(conn)
    }

    #[test]
    fn add_rejects_duplicate_category_and_name() {
        let store = store();
        store.add("clothing", "jacket", HashMap::new(), "a jacket", "").unwrap();
        let result = store.add("clothing", "jacket", HashMap::new(), "a different jacket", "");
        assert!(matches!(result, Err(InventoryError::AlreadyExists { .. })));
    }

    #[test]
    fn list_applies_attribute_filters() {
        let store = store();
        let mut red = HashMap::new();
        red.insert("color".to_string(), "red".to_string());
        store.add("clothing", "scarf", red, "a scarf", "").unwrap();
        store.add("clothing", "hat", HashMap::new(), "a hat", "").unwrap();

        let mut filter = HashMap::new();
        filter.insert("color".to_string(), "red".to_string());
        let filtered = store.list("clothing", &filter).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "scarf");
    }

    #[test]
    fn enter_space_reads_sensory_description() {
        let store = store();
        store
            .add("space", "library", HashMap::new(), "a quiet library", "dust and old paper")
            .unwrap();
        let entry = store.enter_space("library").unwrap();
        assert_eq!(entry.sensory_description, "dust and old paper");
    }

    #[test]
    fn enter_space_missing_returns_not_found() {
        let store = store();
        let result = store.enter_space("nowhere");
        assert!(matches!(result, Err(InventoryError::NotFound { .. })));
    }
}
