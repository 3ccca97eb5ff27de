use anamnesis_core::ids::EntityUuid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Closed entity-type schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Place,
    Concept,
    Symbol,
    TechnicalArtifact,
    Event,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Place => "place",
            EntityType::Concept => "concept",
            EntityType::Symbol => "symbol",
            EntityType::TechnicalArtifact => "technical_artifact",
            EntityType::Event => "event",
        }
    }
}

/// Closed edge-type schema.
///
/// Each variant carries an intended-use doc comment so the extraction
/// prompt (built in `extraction::build_prompt`) can surface them verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// One person is acquainted with another.
    Knows,
    /// A person works on a project, concept, or artifact.
    WorksOn,
    /// An entity is situated at a place.
    LocatedIn,
    /// An episode references an entity without a stronger relation applying.
    Mentions,
    /// A person or entity owns another entity.
    Owns,
    /// A generic relation not covered by a more specific type.
    RelatesTo,
    /// The fact being recorded contradicts a currently active edge.
    Contradicts,
    /// The fact being recorded supersedes (updates) a currently active edge.
    Supersedes,
}

impl EdgeType {
    /// Single-valued predicates expire the prior edge between the same
    /// (source, target) instead of coexisting with it.
    pub fn is_single_valued(&self) -> bool {
        matches!(self, EdgeType::LocatedIn | EdgeType::Owns)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Knows => "knows",
            EdgeType::WorksOn => "works_on",
            EdgeType::LocatedIn => "located_in",
            EdgeType::Mentions => "mentions",
            EdgeType::Owns => "owns",
            EdgeType::RelatesTo => "relates_to",
            EdgeType::Contradicts => "contradicts",
            EdgeType::Supersedes => "supersedes",
        }
    }
}

/// For a given (source-type, target-type) pair, the edge types the
/// extractor is allowed to emit.
pub fn allowed_edge_types(source: EntityType, target: EntityType) -> HashSet<EdgeType> {
    use EntityType::*;
    let mut allowed = HashSet::new();
    allowed.insert(EdgeType::Mentions);
    allowed.insert(EdgeType::RelatesTo);
    allowed.insert(EdgeType::Contradicts);
    allowed.insert(EdgeType::Supersedes);
    match (source, target) {
        (Person, Person) => {
            allowed.insert(EdgeType::Knows);
        }
        (Person, Place) => {
            allowed.insert(EdgeType::LocatedIn);
        }
        (Person, Concept) | (Person, TechnicalArtifact) | (Person, Event) => {
            allowed.insert(EdgeType::WorksOn);
            allowed.insert(EdgeType::Owns);
        }
        (Person, Symbol) => {
            allowed.insert(EdgeType::Owns);
        }
        _ => {}
    }
    allowed
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityNode {
    pub uuid: EntityUuid,
    pub name: String,
    pub types: Vec<EntityType>,
    pub summary: String,
    pub created_at: String,
    pub last_mentioned_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub uuid: EntityUuid,
    pub source_uuid: EntityUuid,
    pub target_uuid: EntityUuid,
    pub predicate: EdgeType,
    pub fact: String,
    pub valid_from: String,
    pub valid_to: Option<String>,
    pub created_at: String,
    pub expired_at: Option<String>,
}

impl RelationEdge {
    /// Current iff not expired and (no `valid_to` or it's still in the
    /// future).
    pub fn is_current(&self, now: &str) -> bool {
        if self.expired_at.is_some() {
            return false;
        }
        match &self.valid_to {
            Some(valid_to) => valid_to.as_str() > now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodeMetadata {
    pub channel: String,
    pub speaker: String,
    pub role: String,
    pub timestamp: String,
}

/// The unit handed to the extractor. Not stored as-is — it produces nodes
/// and edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEpisode {
    pub episode_name: String,
    pub body: String,
    pub metadata: EpisodeMetadata,
}

/// A scored edge returned by a hybrid search recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEdge {
    pub uuid: EntityUuid,
    pub fact: String,
    pub source_name: String,
    pub target_name: String,
    pub predicate: EdgeType,
    pub score: f64,
    pub valid_from: String,
}

/// Returned by `ingestion_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionStats {
    pub entities: usize,
    pub edges: usize,
    pub episodes_ingested: usize,
    pub sentinel_messages: usize,
}
