use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrystalError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("summary {id} not found")]
    NotFound { id: i64 },

    #[error("no unsummarized messages in range")]
    NoMessages,

    #[error("only {found} unsummarized messages, need at least {min_batch}")]
    InsufficientMessages { found: i64, min_batch: i64 },

    #[error("invalid range: start {start} > end {end}")]
    InvalidRange { start: i64, end: i64 },
}

impl From<CrystalError> for ApiError {
    fn from(err: CrystalError) -> Self {
        match err {
            CrystalError::NotFound { id } => {
                ApiError::new(ErrorKind::NotFound, format!("summary {id} not found"))
            }
            CrystalError::NoMessages => {
                ApiError::new(ErrorKind::Invariant, "no unsummarized messages in range")
            }
            CrystalError::InsufficientMessages { found, min_batch } => ApiError::new(
                ErrorKind::Invariant,
                format!("only {found} unsummarized messages, need at least {min_batch}"),
            ),
            CrystalError::InvalidRange { start, end } => ApiError::new(
                ErrorKind::InputShape,
                format!("invalid range: start {start} > end {end}"),
            ),
            CrystalError::Database(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("database error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CrystalError>;
