use anamnesis_core::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("item {category}/{name} not found")]
    NotFound { category: String, name: String },

    #[error("item {category}/{name} already exists")]
    AlreadyExists { category: String, name: String },

    #[error("space {name} not found")]
    SpaceNotFound { name: String },
}

impl From<InventoryError> for ApiError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound { category, name } => {
                ApiError::new(ErrorKind::NotFound, format!("item {category}/{name} not found"))
            }
            InventoryError::SpaceNotFound { name } => {
                ApiError::new(ErrorKind::NotFound, format!("space {name} not found"))
            }
            InventoryError::AlreadyExists { category, name } => ApiError::new(
                ErrorKind::Invariant,
                format!("item {category}/{name} already exists"),
            ),
            InventoryError::Database(e) => {
                ApiError::new(ErrorKind::DependencyDown, format!("database error: {e}"))
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, InventoryError>;
