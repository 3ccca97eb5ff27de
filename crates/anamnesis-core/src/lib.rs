pub mod clock;
pub mod config;
pub mod error;
pub mod ids;

pub use clock::{Clock, SystemClock};
pub use config::AnamnesisConfig;
pub use error::{ApiError, ErrorKind, Result};
pub use ids::{AnchorId, BatchId, EntityUuid, MessageId, SummaryId};
