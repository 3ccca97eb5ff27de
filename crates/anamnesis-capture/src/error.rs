use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("message {id} not found")]
    NotFound { id: i64 },

    #[error("invalid channel filter: {0}")]
    InvalidFilter(String),
}

impl From<CaptureError> for ApiError {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::NotFound { id } => {
                ApiError::new(ErrorKind::NotFound, format!("message {id} not found"))
            }
            CaptureError::InvalidFilter(msg) => ApiError::new(ErrorKind::InputShape, msg),
            CaptureError::Database(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("database error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, CaptureError>;
