pub mod dedup;
pub mod error;
pub mod extraction;
pub mod search;
pub mod store;
pub mod types;

pub use dedup::{DuplicateGroup, MergeOutcome};
pub use error::{Result, TextureError};
pub use extraction::{build_prompt, validate, ExtractedEdge, ExtractedEntity, ExtractionContext, ExtractionResult};
pub use search::{edge_hybrid_search_node_distance, edge_hybrid_search_rrf, node_hybrid_search_rrf, timeline};
pub use store::TextureStore;
pub use types::{
    EdgeType, EntityNode, EntityType, EpisodeMetadata, GraphEpisode, IngestionStats, RelationEdge,
    ScoredEdge,
};
