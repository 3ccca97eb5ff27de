//! Retrieval recipes over the texture graph. The ranking idiom (reciprocal
//! rank fusion across independent candidate lists) and the standard k=60
//! constant are the same ones used for episodic memory fusion elsewhere in
//! this codebase's lineage.

use std::collections::HashMap;

use tracing::instrument;

use anamnesis_core::ids::EntityUuid;

use crate::error::Result;
use crate::store::TextureStore;
use crate::types::{RelationEdge, ScoredEdge};

const RRF_K: f64 = 60.0;

/// Fuses ranked candidate lists (BM25 text match, embedding/name overlap,
/// recency) into one score per edge by reciprocal rank fusion: each list
/// contributes `1 / (RRF_K + rank + 1)` to whichever edges it ranked,
/// regardless of the lists' native score scales.
fn rrf_fuse(ranked_lists: &[Vec<EntityUuid>]) -> HashMap<EntityUuid, f64> {
    let mut scores: HashMap<EntityUuid, f64> = HashMap::new();
    for list in ranked_lists {
        for (rank, uuid) in list.iter().enumerate() {
            let contribution = 1.0 / (RRF_K + rank as f64 + 1.0);
            scores
                .entry(uuid.clone())
                .and_modify(|s| *s += contribution)
                .or_insert(contribution);
        }
    }
    scores
}

fn to_scored(edge: &RelationEdge, score: f64, names: &HashMap<EntityUuid, String>) -> ScoredEdge {
    ScoredEdge {
        uuid: edge.uuid.clone(),
        fact: edge.fact.clone(),
        source_name: names.get(&edge.source_uuid).cloned().unwrap_or_default(),
        target_name: names.get(&edge.target_uuid).cloned().unwrap_or_default(),
        predicate: edge.predicate,
        score,
        valid_from: edge.valid_from.clone(),
    }
}

async fn entity_names(store: &TextureStore, edges: &[RelationEdge]) -> Result<HashMap<EntityUuid, String>> {
    let mut names = HashMap::new();
    for edge in edges {
        for uuid in [&edge.source_uuid, &edge.target_uuid] {
            if names.contains_key(uuid) {
                continue;
            }
            if let Ok(node) = store.get_entity(uuid).await {
                names.insert(uuid.clone(), node.name);
            }
        }
    }
    Ok(names)
}

/// Text-match rank fused with recency rank, over all currently-valid edges
/// whose fact matches `query`.
#[instrument(skip(store))]
pub async fn edge_hybrid_search_rrf(store: &TextureStore, query: &str, limit: usize, now: &str) -> Result<Vec<ScoredEdge>> {
    let text_matches = store.edges_matching_text(query, limit.max(20)).await?;
    let mut by_uuid: HashMap<EntityUuid, RelationEdge> = HashMap::new();
    let text_rank: Vec<EntityUuid> = text_matches
        .into_iter()
        .filter(|(edge, _)| edge.is_current(now))
        .map(|(edge, _)| {
            let uuid = edge.uuid.clone();
            by_uuid.insert(uuid.clone(), edge);
            uuid
        })
        .collect();

    let mut recency_candidates: Vec<RelationEdge> = by_uuid.values().cloned().collect();
    recency_candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recency_rank: Vec<EntityUuid> = recency_candidates.iter().map(|e| e.uuid.clone()).collect();

    let scores = rrf_fuse(&[text_rank, recency_rank]);
    let names = entity_names(store, &by_uuid.values().cloned().collect::<Vec<_>>()).await?;

    let mut results: Vec<ScoredEdge> = scores
        .iter()
        .filter_map(|(uuid, score)| by_uuid.get(uuid).map(|e| to_scored(e, *score, &names)))
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results.truncate(limit);
    Ok(results)
}

/// Edges whose source or target is within `hops` graph-steps of `origin`,
/// ranked by distance then by recency among equal-distance edges.
#[instrument(skip(store))]
pub async fn edge_hybrid_search_node_distance(
    store: &TextureStore,
    origin: &EntityUuid,
    hops: usize,
    limit: usize,
    now: &str,
) -> Result<Vec<ScoredEdge>> {
    let mut frontier = vec![origin.clone()];
    let mut visited = std::collections::HashSet::new();
    visited.insert(origin.clone());
    let mut by_distance: Vec<Vec<RelationEdge>> = Vec::new();

    for _ in 0..hops.max(1) {
        let mut layer = Vec::new();
        let mut next_frontier = Vec::new();
        for node in &frontier {
            let edges = store.current_edges_for(node, now).await?;
            for edge in edges {
                let other = if &edge.source_uuid == node {
                    edge.target_uuid.clone()
                } else {
                    edge.source_uuid.clone()
                };
                if visited.insert(other.clone()) {
                    next_frontier.push(other);
                }
                layer.push(edge);
            }
        }
        by_distance.push(layer);
        frontier = next_frontier;
        if frontier.is_empty() {
            break;
        }
    }

    let mut flattened = Vec::new();
    for (distance, layer) in by_distance.into_iter().enumerate() {
        let weight = 1.0 / (distance as f64 + 1.0);
        flattened.extend(layer.into_iter().map(|e| (e, weight)));
    }
    flattened.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    flattened.dedup_by(|a, b| a.0.uuid == b.0.uuid);
    flattened.truncate(limit);

    let edges: Vec<RelationEdge> = flattened.iter().map(|(e, _)| e.clone()).collect();
    let names = entity_names(store, &edges).await?;
    Ok(flattened
        .into_iter()
        .map(|(e, weight)| to_scored(&e, weight, &names))
        .collect())
}

/// Entities whose name matches `query`, ranked by a fusion of name-match
/// rank and connectivity rank (more-connected nodes surface first among
/// equally good name matches).
#[instrument(skip(store))]
pub async fn node_hybrid_search_rrf(store: &TextureStore, query: &str, limit: usize) -> Result<Vec<EntityUuid>> {
    let matches = store.find_entities_by_name(query, &[]).await?;
    let name_rank: Vec<EntityUuid> = matches.iter().map(|n| n.uuid.clone()).collect();

    let mut with_degree = Vec::with_capacity(matches.len());
    for node in &matches {
        let degree = store.edge_count(&node.uuid).await?;
        with_degree.push((node.uuid.clone(), degree));
    }
    with_degree.sort_by(|a, b| b.1.cmp(&a.1));
    let degree_rank: Vec<EntityUuid> = with_degree.into_iter().map(|(uuid, _)| uuid).collect();

    let scores = rrf_fuse(&[name_rank, degree_rank]);
    let mut ranked: Vec<(EntityUuid, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(limit);
    Ok(ranked.into_iter().map(|(uuid, _)| uuid).collect())
}

/// Every current edge touching `uuid`, oldest-first — the entity's
/// timeline view for the exploration tools.
#[instrument(skip(store))]
pub async fn timeline(store: &TextureStore, uuid: &EntityUuid, now: &str) -> Result<Vec<ScoredEdge>> {
    let mut edges = store.current_edges_for(uuid, now).await?;
    edges.sort_by(|a, b| a.valid_from.cmp(&b.valid_from));
    let names = entity_names(store, &edges).await?;
    Ok(edges.iter().map(|e| to_scored(e, 0.0, &names)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_rewards_items_ranked_highly_across_lists() {
        let a = EntityUuid("a".into());
        let b = EntityUuid("b".into());
        let lists = vec![vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]];
        let scores = rrf_fuse(&lists);
        assert!((scores[&a] - scores[&b]).abs() < 1e-9);
    }

    #[test]
    fn rrf_top_rank_beats_absent_from_one_list() {
        let a = EntityUuid("a".into());
        let b = EntityUuid("b".into());
        let lists = vec![vec![a.clone(), b.clone()], vec![a.clone()]];
        let scores = rrf_fuse(&lists);
        assert!(scores[&a] > scores[&b]);
    }
}
