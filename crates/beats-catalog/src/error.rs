//! Catalog Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog store errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Underlying database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be decoded (bad decimal, unknown status)
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Input rejected before touching the store
    #[error("Validation error: {0}")]
    Validation(String),

    /// In-memory store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Database(_) | CatalogError::Storage(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CatalogError::Validation(msg) => msg.clone(),
            _ => "The catalog is temporarily unavailable.".into(),
        }
    }
}
