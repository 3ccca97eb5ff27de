pub mod completions;
pub mod controller;
pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use completions::{AnthropicCompletions, CompletionsProvider};
pub use controller::IngestionController;
pub use error::{IngestError, Result};
pub use store::BatchStore;
pub use types::{BatchStatus, IngestionBatch, TickOutcome};
