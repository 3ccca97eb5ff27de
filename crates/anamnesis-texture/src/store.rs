use surrealdb::engine::any::{connect, Any};
use surrealdb::{RecordId, Surreal};
use tracing::instrument;

use anamnesis_core::ids::EntityUuid;

use crate::error::{Result, TextureError};
use crate::types::{EntityNode, EntityType, RelationEdge};

const ENTITY_TABLE: &str = "entity_node";
const EDGE_TABLE: &str = "relates_to";

/// Owns the embedded (or remote) SurrealDB connection backing L3.
///
/// Grounded on `other_examples/52badffb_perstarkse-minne`'s `SurrealDbClient`
/// — one connection, namespace + database selected once at construction,
/// raw `RELATE ... CONTENT {...}` inside `BEGIN/COMMIT TRANSACTION` for the
/// graph-native writes that the typed query builder doesn't cover.
pub struct TextureStore {
    db: Surreal<Any>,
}

impl TextureStore {
    #[instrument(skip(endpoint))]
    pub async fn connect(endpoint: &str, namespace: &str, database: &str) -> Result<Self> {
        let db = connect(endpoint).await?;
        db.use_ns(namespace).use_db(database).await?;
        let store = Self { db };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.db
            .query(
                "
                DEFINE TABLE IF NOT EXISTS entity_node SCHEMALESS;
                DEFINE INDEX IF NOT EXISTS idx_entity_name ON entity_node FIELDS name;
                DEFINE ANALYZER IF NOT EXISTS facts TOKENIZERS blank,class FILTERS lowercase,snowball(english);
                DEFINE TABLE IF NOT EXISTS relates_to SCHEMALESS TYPE RELATION FROM entity_node TO entity_node;
                DEFINE INDEX IF NOT EXISTS idx_edge_fact_fts ON relates_to FIELDS fact SEARCH ANALYZER facts BM25;
                ",
            )
            .await?;
        Ok(())
    }

    /// Insert or update the canonical node for `(name, types)`. Resolution
    /// is keyed on the canonical identity: lowercased name plus type-set
    /// overlap, so a Person "Phoenix" and a Place "Phoenix" stay distinct.
    #[instrument(skip(self, summary))]
    pub async fn upsert_entity(
        &self,
        name: &str,
        types: Vec<EntityType>,
        summary: &str,
        now: &str,
    ) -> Result<EntityNode> {
        if let Some(existing) = self.find_entity_by_name(name, &types).await? {
            let record_id = RecordId::from((ENTITY_TABLE, existing.uuid.as_str()));
            let updated: Option<EntityNode> = self
                .db
                .update(record_id)
                .merge(serde_json::json!({ "last_mentioned_at": now }))
                .await?;
            return updated.ok_or(TextureError::EntityNotFound {
                uuid: existing.uuid.0,
            });
        }

        let uuid = EntityUuid::new();
        let node = EntityNode {
            uuid: uuid.clone(),
            name: name.to_string(),
            types,
            summary: summary.to_string(),
            created_at: now.to_string(),
            last_mentioned_at: now.to_string(),
        };
        let record_id = RecordId::from((ENTITY_TABLE, uuid.as_str()));
        let created: Option<EntityNode> = self.db.create(record_id).content(node.clone()).await?;
        created.ok_or(TextureError::EntityNotFound { uuid: uuid.0 })
    }

    /// Lowercased-name lookup. When `types` is non-empty, only a node whose
    /// stored type-set overlaps it matches — the canonical `(lowercased
    /// name, type-set)` identity key. An empty slice matches on name alone,
    /// for callers (primary-entity resolution, admin lookups) that have no
    /// type context to narrow by.
    #[instrument(skip(self))]
    pub async fn find_entity_by_name(&self, name: &str, types: &[EntityType]) -> Result<Option<EntityNode>> {
        let lowered = name.to_lowercase();
        let nodes: Vec<EntityNode> = if types.is_empty() {
            let mut result = self
                .db
                .query("SELECT * FROM entity_node WHERE string::lowercase(name) = $name LIMIT 1")
                .bind(("name", lowered))
                .await?;
            result.take(0)?
        } else {
            let type_strs: Vec<&str> = types.iter().map(EntityType::as_str).collect();
            let mut result = self
                .db
                .query("SELECT * FROM entity_node WHERE string::lowercase(name) = $name AND types CONTAINSANY $types LIMIT 1")
                .bind(("name", lowered))
                .bind(("types", type_strs))
                .await?;
            result.take(0)?
        };
        Ok(nodes.into_iter().next())
    }

    /// All nodes sharing a lowercased name, narrowed by type-set overlap
    /// when `types` is non-empty (see `find_entity_by_name`). Used by the
    /// dedup pass to detect duplicates.
    #[instrument(skip(self))]
    pub async fn find_entities_by_name(&self, name: &str, types: &[EntityType]) -> Result<Vec<EntityNode>> {
        let lowered = name.to_lowercase();
        if types.is_empty() {
            let mut result = self
                .db
                .query("SELECT * FROM entity_node WHERE string::lowercase(name) = $name")
                .bind(("name", lowered))
                .await?;
            return Ok(result.take(0)?);
        }
        let type_strs: Vec<&str> = types.iter().map(EntityType::as_str).collect();
        let mut result = self
            .db
            .query("SELECT * FROM entity_node WHERE string::lowercase(name) = $name AND types CONTAINSANY $types")
            .bind(("name", lowered))
            .bind(("types", type_strs))
            .await?;
        Ok(result.take(0)?)
    }

    #[instrument(skip(self))]
    pub async fn get_entity(&self, uuid: &EntityUuid) -> Result<EntityNode> {
        let record_id = RecordId::from((ENTITY_TABLE, uuid.as_str()));
        let node: Option<EntityNode> = self.db.select(record_id).await?;
        node.ok_or_else(|| TextureError::EntityNotFound { uuid: uuid.0.clone() })
    }

    /// Count of edges touching an entity — the "most-connected" tiebreak
    /// used when picking the dedup merge target.
    #[instrument(skip(self))]
    pub async fn edge_count(&self, uuid: &EntityUuid) -> Result<usize> {
        let mut result = self
            .db
            .query(
                "SELECT count() AS c FROM relates_to WHERE in = $id OR out = $id GROUP ALL",
            )
            .bind(("id", RecordId::from((ENTITY_TABLE, uuid.as_str()))))
            .await?;
        let counts: Vec<CountRow> = result.take(0)?;
        Ok(counts.first().map(|r| r.c).unwrap_or(0))
    }

    /// Create an edge, expiring a conflicting single-valued predecessor
    /// first if one exists.
    #[instrument(skip(self, fact))]
    pub async fn create_edge(
        &self,
        source: &EntityUuid,
        target: &EntityUuid,
        predicate: crate::types::EdgeType,
        fact: &str,
        valid_from: &str,
        now: &str,
    ) -> Result<RelationEdge> {
        if predicate.is_single_valued() {
            self.expire_current_edges(source, predicate, now).await?;
        }

        let uuid = EntityUuid::new();
        let edge = RelationEdge {
            uuid: uuid.clone(),
            source_uuid: source.clone(),
            target_uuid: target.clone(),
            predicate,
            fact: fact.to_string(),
            valid_from: valid_from.to_string(),
            valid_to: None,
            created_at: now.to_string(),
            expired_at: None,
        };

        self.db
            .query(
                "BEGIN TRANSACTION;
                 RELATE $in->relates_to->$out CONTENT {
                     id: $edge_id,
                     predicate: $predicate,
                     fact: $fact,
                     valid_from: $valid_from,
                     valid_to: NONE,
                     created_at: $now,
                     expired_at: NONE
                 };
                 COMMIT TRANSACTION;",
            )
            .bind(("in", RecordId::from((ENTITY_TABLE, source.as_str()))))
            .bind(("out", RecordId::from((ENTITY_TABLE, target.as_str()))))
            .bind(("edge_id", RecordId::from((EDGE_TABLE, uuid.as_str()))))
            .bind(("predicate", predicate.as_str()))
            .bind(("fact", fact.to_string()))
            .bind(("valid_from", valid_from.to_string()))
            .bind(("now", now.to_string()))
            .await?;

        Ok(edge)
    }

    async fn expire_current_edges(
        &self,
        source: &EntityUuid,
        predicate: crate::types::EdgeType,
        now: &str,
    ) -> Result<()> {
        self.db
            .query(
                "UPDATE relates_to SET expired_at = $now
                 WHERE in = $source AND predicate = $predicate AND expired_at = NONE",
            )
            .bind(("source", RecordId::from((ENTITY_TABLE, source.as_str()))))
            .bind(("predicate", predicate.as_str()))
            .bind(("now", now.to_string()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_edge(&self, uuid: &EntityUuid) -> Result<()> {
        let record_id = RecordId::from((EDGE_TABLE, uuid.as_str()));
        let _: Option<RelationEdge> = self.db.delete(record_id).await?;
        Ok(())
    }

    /// Current (non-expired, non-future-expired) edges touching `uuid`, in
    /// no particular order — callers sort as needed.
    #[instrument(skip(self))]
    pub async fn current_edges_for(&self, uuid: &EntityUuid, now: &str) -> Result<Vec<RelationEdge>> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM relates_to
                 WHERE (in = $id OR out = $id)
                   AND expired_at = NONE
                   AND (valid_to = NONE OR valid_to > $now)",
            )
            .bind(("id", RecordId::from((ENTITY_TABLE, uuid.as_str()))))
            .bind(("now", now.to_string()))
            .await?;
        Ok(result.take(0)?)
    }

    /// Every current edge in the graph — the candidate pool hybrid search
    /// ranks over. Fine for the scale this engine targets; a standalone
    /// deployment would page this.
    #[instrument(skip(self))]
    pub async fn all_current_edges(&self, now: &str) -> Result<Vec<RelationEdge>> {
        let mut result = self
            .db
            .query("SELECT * FROM relates_to WHERE expired_at = NONE AND (valid_to = NONE OR valid_to > $now)")
            .bind(("now", now.to_string()))
            .await?;
        Ok(result.take(0)?)
    }

    #[instrument(skip(self))]
    pub async fn edges_matching_text(&self, query: &str, limit: usize) -> Result<Vec<(RelationEdge, f64)>> {
        let mut result = self
            .db
            .query(
                "SELECT *, search::score(1) AS score FROM relates_to
                 WHERE fact @1@ $query AND expired_at = NONE
                 ORDER BY score DESC LIMIT $limit",
            )
            .bind(("query", query.to_string()))
            .bind(("limit", limit as i64))
            .await?;
        let rows: Vec<ScoredEdgeRow> = result.take(0)?;
        Ok(rows.into_iter().map(|r| (r.edge, r.score)).collect())
    }

    pub async fn delete_entity(&self, uuid: &EntityUuid) -> Result<()> {
        let record_id = RecordId::from((ENTITY_TABLE, uuid.as_str()));
        let _: Option<EntityNode> = self.db.delete(record_id).await?;
        Ok(())
    }

    /// Re-parent every edge pointing at `from` onto `to` — used by the
    /// dedup merge.
    #[instrument(skip(self))]
    pub async fn reparent_edges(&self, from: &EntityUuid, to: &EntityUuid) -> Result<usize> {
        let from_id = RecordId::from((ENTITY_TABLE, from.as_str()));
        let to_id = RecordId::from((ENTITY_TABLE, to.as_str()));
        let mut result = self
            .db
            .query(
                "UPDATE relates_to SET in = $to WHERE in = $from;
                 UPDATE relates_to SET out = $to WHERE out = $from;",
            )
            .bind(("from", from_id))
            .bind(("to", to_id))
            .await?;
        let updated_in: Vec<RelationEdge> = result.take(0)?;
        let updated_out: Vec<RelationEdge> = result.take(1)?;
        Ok(updated_in.len() + updated_out.len())
    }

    /// Cheap liveness probe for the health aggregator.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<()> {
        self.db.query("INFO FOR DB").await?;
        Ok(())
    }

    /// Total entity and edge counts, for ingestion-stats reporting.
    #[instrument(skip(self))]
    pub async fn graph_counts(&self) -> Result<(usize, usize)> {
        let mut result = self
            .db
            .query("SELECT count() AS c FROM entity_node GROUP ALL")
            .query("SELECT count() AS c FROM relates_to GROUP ALL")
            .await?;
        let entities: Vec<CountRow> = result.take(0)?;
        let edges: Vec<CountRow> = result.take(1)?;
        Ok((
            entities.first().map(|r| r.c).unwrap_or(0),
            edges.first().map(|r| r.c).unwrap_or(0),
        ))
    }
}

#[derive(serde::Deserialize)]
struct CountRow {
    c: usize,
}

#[derive(serde::Deserialize)]
struct ScoredEdgeRow {
    #[serde(flatten)]
    edge: RelationEdge,
    score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EdgeType;

    async fn store() -> TextureStore {
        TextureStore::connect("mem://", "test", "test").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_entity_is_idempotent_by_name() {
        let store = store().await;
        let first = store
            .upsert_entity("Alice", vec![EntityType::Person], "a person", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let second = store
            .upsert_entity("alice", vec![EntityType::Person], "a person", "2026-01-02T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(first.uuid, second.uuid);
        assert_eq!(second.last_mentioned_at, "2026-01-02T00:00:00Z");
    }

    #[tokio::test]
    async fn same_name_different_type_stays_distinct() {
        let store = store().await;
        let person = store
            .upsert_entity("Phoenix", vec![EntityType::Person], "a person", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let place = store
            .upsert_entity("Phoenix", vec![EntityType::Place], "a city", "2026-01-02T00:00:00Z")
            .await
            .unwrap();
        assert_ne!(person.uuid, place.uuid);

        let both = store.find_entities_by_name("Phoenix", &[]).await.unwrap();
        assert_eq!(both.len(), 2);
    }

    #[tokio::test]
    async fn single_valued_predicate_expires_prior_edge() {
        let store = store().await;
        let alice = store
            .upsert_entity("Alice", vec![EntityType::Person], "a person", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let austin = store
            .upsert_entity("Austin", vec![EntityType::Place], "a city", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let denver = store
            .upsert_entity("Denver", vec![EntityType::Place], "a city", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        store
            .create_edge(
                &alice.uuid,
                &austin.uuid,
                EdgeType::LocatedIn,
                "Alice lives in Austin",
                "2026-01-01T00:00:00Z",
                "2026-01-01T00:00:00Z",
            )
            .await
            .unwrap();
        store
            .create_edge(
                &alice.uuid,
                &denver.uuid,
                EdgeType::LocatedIn,
                "Alice moved to Denver",
                "2026-02-01T00:00:00Z",
                "2026-02-01T00:00:00Z",
            )
            .await
            .unwrap();

        let current = store.current_edges_for(&alice.uuid, "2026-02-02T00:00:00Z").await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].target_uuid, denver.uuid);
    }

    #[tokio::test]
    async fn reparent_edges_moves_both_directions() {
        let store = store().await;
        let alice = store
            .upsert_entity("Alice", vec![EntityType::Person], "a person", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let alice_dup = store
            .upsert_entity("Alice2", vec![EntityType::Person], "a duplicate", "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        let bob = store
            .upsert_entity("Bob", vec![EntityType::Person], "a person", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        store
            .create_edge(&alice_dup.uuid, &bob.uuid, EdgeType::Knows, "Alice knows Bob", "2026-01-01T00:00:00Z", "2026-01-01T00:00:00Z")
            .await
            .unwrap();

        let moved = store.reparent_edges(&alice_dup.uuid, &alice.uuid).await.unwrap();
        assert_eq!(moved, 1);

        let edges = store.current_edges_for(&alice.uuid, "2026-01-02T00:00:00Z").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source_uuid, alice.uuid);
    }
}
