//! Self-healing deduplication: entities that resolve to the same name can
//! still end up as separate nodes when two episodes are ingested out of
//! order. `scan` finds the duplicate groups; `merge_group` folds them into
//! the most-connected node and reparents every edge onto it.
//!
//! Driven from `anamnesis-ingest`'s ingestion tick on the set of entity
//! names an ingested batch actually touched, and previewable dry-run via
//! the `dedup_preview` admin tool.

use tracing::{info, instrument};

use anamnesis_core::ids::EntityUuid;

use crate::error::Result;
use crate::store::TextureStore;
use crate::types::EntityNode;

#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub name: String,
    pub nodes: Vec<EntityNode>,
}

#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    pub kept: Option<EntityUuid>,
    pub removed: Vec<EntityUuid>,
    pub edges_reparented: usize,
}

/// Groups every entity in `candidate_names` by lowercased name and
/// type-set overlap — the same canonical identity key `upsert_entity` uses
/// — keeping only groups with at least `dedup_threshold` nodes. Callers
/// drive this from the set of names touched by a recent ingestion batch
/// rather than scanning the whole graph every tick.
#[instrument(skip(store))]
pub async fn scan(
    store: &TextureStore,
    candidate_names: &[String],
    dedup_threshold: usize,
) -> Result<Vec<DuplicateGroup>> {
    let mut groups = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for name in candidate_names {
        let key = name.to_lowercase();
        if !seen.insert(key) {
            continue;
        }
        let nodes = store.find_entities_by_name(name, &[]).await?;
        for cluster in group_by_type_overlap(nodes) {
            if cluster.len() >= dedup_threshold.max(2) {
                groups.push(DuplicateGroup {
                    name: name.clone(),
                    nodes: cluster,
                });
            }
        }
    }
    Ok(groups)
}

/// Splits same-name nodes into type-consistent clusters so a Person
/// "Phoenix" and a Place "Phoenix" are never proposed as duplicates of
/// each other, even though `find_entities_by_name` returns both.
fn group_by_type_overlap(nodes: Vec<EntityNode>) -> Vec<Vec<EntityNode>> {
    let mut clusters: Vec<Vec<EntityNode>> = Vec::new();
    'node: for node in nodes {
        for cluster in &mut clusters {
            if cluster.iter().any(|member| member.types.iter().any(|t| node.types.contains(t))) {
                cluster.push(node);
                continue 'node;
            }
        }
        clusters.push(vec![node]);
    }
    clusters
}

/// Merges a duplicate group onto its most-connected node (ties broken by
/// earliest `created_at`), reparenting every edge and deleting the losers.
/// With `dry_run` true, reports what would happen without writing anything
/// — used by the admin `dedup_preview` tool.
#[instrument(skip(store, group))]
pub async fn merge_group(
    store: &TextureStore,
    group: &DuplicateGroup,
    dry_run: bool,
) -> Result<MergeOutcome> {
    if group.nodes.len() < 2 {
        return Ok(MergeOutcome::default());
    }

    let mut scored = Vec::with_capacity(group.nodes.len());
    for node in &group.nodes {
        let connections = store.edge_count(&node.uuid).await?;
        scored.push((node, connections));
    }
    scored.sort_by(|a, b| match b.1.cmp(&a.1) {
        std::cmp::Ordering::Equal => a.0.created_at.cmp(&b.0.created_at),
        other => other,
    });

    let (winner, _) = scored[0];
    let losers: Vec<&EntityNode> = scored[1..].iter().map(|(n, _)| *n).collect();

    if dry_run {
        return Ok(MergeOutcome {
            kept: Some(winner.uuid.clone()),
            removed: losers.iter().map(|n| n.uuid.clone()).collect(),
            edges_reparented: 0,
        });
    }

    let mut reparented = 0;
    for loser in &losers {
        reparented += store.reparent_edges(&loser.uuid, &winner.uuid).await?;
        store.delete_entity(&loser.uuid).await?;
        info!(name = %group.name, from = %loser.uuid, to = %winner.uuid, "merged duplicate entity");
    }

    Ok(MergeOutcome {
        kept: Some(winner.uuid.clone()),
        removed: losers.into_iter().map(|n| n.uuid.clone()).collect(),
        edges_reparented: reparented,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntityType;

    fn node(uuid: &str, created_at: &str) -> EntityNode {
        EntityNode {
            uuid: EntityUuid(uuid.to_string()),
            name: "Alice".into(),
            types: vec![EntityType::Person],
            summary: "a person".into(),
            created_at: created_at.to_string(),
            last_mentioned_at: created_at.to_string(),
        }
    }

    #[test]
    fn group_with_single_node_is_not_a_duplicate() {
        let group = DuplicateGroup {
            name: "Alice".into(),
            nodes: vec![node("a", "2026-01-01T00:00:00Z")],
        };
        assert_eq!(group.nodes.len(), 1);
    }
}
