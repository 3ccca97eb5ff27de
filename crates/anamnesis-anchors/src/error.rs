use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("anchor {id} not found")]
    NotFound { id: String },

    #[error("embedding provider unreachable: {0}")]
    EmbeddingUnavailable(String),
}

impl From<AnchorError> for ApiError {
    fn from(err: AnchorError) -> Self {
        match err {
            AnchorError::NotFound { id } => {
                ApiError::new(ErrorKind::NotFound, format!("anchor {id} not found"))
            }
            AnchorError::EmbeddingUnavailable(msg) => ApiError::new(ErrorKind::DependencyDown, msg),
            AnchorError::Database(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("database error: {e}"))
            }
            AnchorError::Io(e) => ApiError::new(ErrorKind::Internal, format!("io error: {e}")),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnchorError>;
