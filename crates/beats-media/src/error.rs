//! Media Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, MediaError>;

/// Blob storage errors
#[derive(Error, Debug)]
pub enum MediaError {
    /// Upload request is missing a field or names no file
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    /// File is neither audio nor an image
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    /// Storage configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request signing failed
    #[error("Signing error: {0}")]
    Signing(String),
}

impl MediaError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            MediaError::InvalidUpload(msg) => msg.clone(),
            MediaError::UnsupportedType(_) => "Only audio and image files can be uploaded.".into(),
            MediaError::Config(_) | MediaError::Signing(_) => {
                "File storage is unavailable right now.".into()
            }
        }
    }
}
