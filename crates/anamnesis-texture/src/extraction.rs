//! Builds the prompt the caller sends to its own completions provider and
//! parses the structured response back into nodes/edges. This crate never
//! calls an LLM itself — the same contract L4's summarizer uses, so the
//! gateway owns the one place a completions client is actually constructed.

use serde::{Deserialize, Serialize};

use crate::types::{allowed_edge_types, EdgeType, EntityType, EpisodeMetadata, GraphEpisode};

/// Proposed node, before resolution against existing entities by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub types: Vec<EntityType>,
    pub summary: String,
}

/// Proposed edge, referencing entities by the name the extractor saw them
/// under — resolution to uuids happens in `dedup`/ingestion, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEdge {
    pub source_name: String,
    pub target_name: String,
    pub predicate: EdgeType,
    pub fact: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub entities: Vec<ExtractedEntity>,
    pub edges: Vec<ExtractedEdge>,
}

/// Ambient disambiguation context threaded into the prompt alongside the
/// episode body: the most recent crystallized summary, if one exists, and
/// the entity names already resolved earlier in the same ingestion batch
/// ("current scene") — so the extractor can tell a pronoun or a bare first
/// name apart from an unrelated entity sharing it.
#[derive(Debug, Clone, Default)]
pub struct ExtractionContext {
    pub recent_summary: Option<String>,
    pub current_scene: Vec<String>,
}

/// Renders the extraction instructions, ambient context, and episode body.
/// The caller sends this verbatim as the user turn of a completions
/// request and is expected to request JSON output matching
/// `ExtractionResult`.
pub fn build_prompt(episode: &GraphEpisode, context: &ExtractionContext) -> String {
    let EpisodeMetadata {
        channel,
        speaker,
        role,
        timestamp,
    } = &episode.metadata;

    let mut ambient = String::new();
    if let Some(summary) = &context.recent_summary {
        ambient.push_str(&format!("Recent summary, for context only: {summary}\n"));
    }
    if !context.current_scene.is_empty() {
        ambient.push_str(&format!(
            "Entities already established earlier in this batch: {}\n",
            context.current_scene.join(", ")
        ));
    }

    format!(
        "Extract entities and relations from the following message so they can be \
         stored in a knowledge graph.\n\n\
         Entity types (pick only from this closed set): person, place, concept, \
         symbol, technical_artifact, event.\n\
         Edge predicates (pick only from this closed set): knows, works_on, \
         located_in, mentions, owns, relates_to, contradicts, supersedes.\n\
         Use `contradicts` when the fact conflicts with something you'd expect to \
         already be recorded, and `supersedes` when it updates rather than \
         conflicts with a prior fact.\n\n\
         {ambient}\
         Episode: {episode_name}\n\
         Channel: {channel}\n\
         Speaker: {speaker} ({role})\n\
         Timestamp: {timestamp}\n\
         ---\n\
         {body}\n\
         ---\n\n\
         Respond with JSON: {{\"entities\": [{{\"name\", \"types\", \"summary\"}}], \
         \"edges\": [{{\"source_name\", \"target_name\", \"predicate\", \"fact\"}}]}}. \
         Only emit entities the message actually establishes; do not invent facts.",
        episode_name = episode.episode_name,
        body = episode.body,
    )
}

/// Drops edges whose predicate isn't allowed between the named entities'
/// types, and edges referencing an entity not present in `result.entities`.
/// Applied to whatever the caller's provider returned before it reaches the
/// store, since the provider can't be trusted to honor the closed schema.
pub fn validate(mut result: ExtractionResult) -> ExtractionResult {
    let types_by_name: std::collections::HashMap<&str, EntityType> = result
        .entities
        .iter()
        .filter_map(|e| e.types.first().map(|t| (e.name.as_str(), *t)))
        .collect();

    result.edges.retain(|edge| {
        let (Some(&source_type), Some(&target_type)) = (
            types_by_name.get(edge.source_name.as_str()),
            types_by_name.get(edge.target_name.as_str()),
        ) else {
            return false;
        };
        allowed_edge_types(source_type, target_type).contains(&edge.predicate)
    });

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode() -> GraphEpisode {
        GraphEpisode {
            episode_name: "msg-1".into(),
            body: "Alice moved to Austin last week.".into(),
            metadata: EpisodeMetadata {
                channel: "main".into(),
                speaker: "alice".into(),
                role: "user".into(),
                timestamp: "2026-01-01T00:00:00Z".into(),
            },
        }
    }

    #[test]
    fn prompt_includes_closed_schema_and_body() {
        let prompt = build_prompt(&episode(), &ExtractionContext::default());
        assert!(prompt.contains("located_in"));
        assert!(prompt.contains("Alice moved to Austin"));
    }

    #[test]
    fn prompt_includes_ambient_context_when_present() {
        let context = ExtractionContext {
            recent_summary: Some("Alice and Bob are planning a trip.".to_string()),
            current_scene: vec!["Bob".to_string()],
        };
        let prompt = build_prompt(&episode(), &context);
        assert!(prompt.contains("Alice and Bob are planning a trip."));
        assert!(prompt.contains("Bob"));
    }

    #[test]
    fn validate_drops_edge_with_unlisted_entity() {
        let result = ExtractionResult {
            entities: vec![ExtractedEntity {
                name: "Alice".into(),
                types: vec![EntityType::Person],
                summary: "a person".into(),
            }],
            edges: vec![ExtractedEdge {
                source_name: "Alice".into(),
                target_name: "Bob".into(),
                predicate: EdgeType::Knows,
                fact: "Alice knows Bob".into(),
            }],
        };
        let validated = validate(result);
        assert!(validated.edges.is_empty());
    }

    #[test]
    fn validate_drops_edge_disallowed_for_type_pair() {
        let result = ExtractionResult {
            entities: vec![
                ExtractedEntity {
                    name: "Alice".into(),
                    types: vec![EntityType::Person],
                    summary: "a person".into(),
                },
                ExtractedEntity {
                    name: "Austin".into(),
                    types: vec![EntityType::Place],
                    summary: "a city".into(),
                },
            ],
            edges: vec![ExtractedEdge {
                source_name: "Alice".into(),
                target_name: "Austin".into(),
                predicate: EdgeType::Knows,
                fact: "Alice knows Austin".into(),
            }],
        };
        let validated = validate(result);
        assert!(validated.edges.is_empty());
    }

    #[test]
    fn validate_keeps_allowed_edge() {
        let result = ExtractionResult {
            entities: vec![
                ExtractedEntity {
                    name: "Alice".into(),
                    types: vec![EntityType::Person],
                    summary: "a person".into(),
                },
                ExtractedEntity {
                    name: "Austin".into(),
                    types: vec![EntityType::Place],
                    summary: "a city".into(),
                },
            ],
            edges: vec![ExtractedEdge {
                source_name: "Alice".into(),
                target_name: "Austin".into(),
                predicate: EdgeType::LocatedIn,
                fact: "Alice moved to Austin".into(),
            }],
        };
        let validated = validate(result);
        assert_eq!(validated.edges.len(), 1);
    }
}
