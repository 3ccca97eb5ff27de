use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("capture layer error: {0}")]
    Capture(#[from] anamnesis_capture::CaptureError),

    #[error("texture layer error: {0}")]
    Texture(#[from] anamnesis_texture::TextureError),

    #[error("completions provider error: {0}")]
    Provider(String),

    #[error("extraction response did not match the closed schema: {0}")]
    SchemaViolation(String),

    #[error("batch {id} not found")]
    BatchNotFound { id: i64 },
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::BatchNotFound { id } => {
                ApiError::new(ErrorKind::NotFound, format!("batch {id} not found"))
            }
            IngestError::SchemaViolation(msg) => ApiError::new(ErrorKind::Invariant, msg),
            IngestError::Provider(msg) => ApiError::new(ErrorKind::DependencyDown, msg),
            IngestError::Database(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("database error: {e}"))
            }
            IngestError::Capture(e) => ApiError::from(e),
            IngestError::Texture(e) => ApiError::from(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
