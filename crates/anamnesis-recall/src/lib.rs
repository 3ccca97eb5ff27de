pub mod budget;
pub mod composer;
pub mod primary;
pub mod types;

pub use budget::estimate_tokens;
pub use composer::Composer;
pub use primary::PrimaryEntityCache;
pub use types::{ClockBlock, Manifest, ManifestLayer, RecallCounts, RecallMode, RecallPackage, RecallRequest};
