pub mod db;
pub mod embedding;
pub mod error;
pub mod store;
pub mod types;

pub use embedding::EmbeddingClient;
pub use error::{AnchorError, Result};
pub use store::{AnchorStore, SyncReport};
pub use types::{Anchor, ScoredAnchor};
