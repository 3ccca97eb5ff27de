use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("graph backend error: {0}")]
    Backend(#[from] surrealdb::Error),

    #[error("entity {uuid} not found")]
    EntityNotFound { uuid: String },

    #[error("edge {uuid} not found")]
    EdgeNotFound { uuid: String },

    #[error("invalid edge: {0}")]
    InvalidEdge(String),
}

impl From<TextureError> for ApiError {
    fn from(err: TextureError) -> Self {
        match err {
            TextureError::EntityNotFound { uuid } => {
                ApiError::new(ErrorKind::NotFound, format!("entity {uuid} not found"))
            }
            TextureError::EdgeNotFound { uuid } => {
                ApiError::new(ErrorKind::NotFound, format!("edge {uuid} not found"))
            }
            TextureError::InvalidEdge(msg) => ApiError::new(ErrorKind::InputShape, msg),
            TextureError::Backend(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("graph backend error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TextureError>;
