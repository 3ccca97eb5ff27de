use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed error taxonomy surfaced identically over HTTP and stdio
/// JSON-RPC. Every layer crate defines its own `thiserror` enum and converts
/// into this one at its public boundary — nothing that crosses a layer
/// boundary is unclassified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InputShape,
    NotFound,
    Invariant,
    DependencyDown,
    Timeout,
    Partial,
    Internal,
}

impl ErrorKind {
    /// HTTP status this kind maps to at the gateway boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InputShape => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Invariant => 409,
            ErrorKind::DependencyDown => 503,
            ErrorKind::Timeout => 504,
            ErrorKind::Partial => 207,
            ErrorKind::Internal => 500,
        }
    }
}

/// An error that has already crossed a layer boundary and been classified.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InputShape, message)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, message)
    }

    pub fn dependency_down(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DependencyDown, message)
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
