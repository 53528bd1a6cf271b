//! Payment Error Types

use beats_catalog::{BeatId, CatalogError};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No authenticated buyer
    #[error("Not signed in")]
    Unauthorized,

    /// Beat missing or not published
    #[error("Beat not found: {0}")]
    BeatNotFound(BeatId),

    /// Beat has no license to sell
    #[error("Beat {0} has no license available")]
    NoLicense(BeatId),

    /// License price cannot be charged
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Gateway call exceeded its deadline
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Checkout metadata missing or not numeric
    #[error("Invalid checkout metadata: {0}")]
    InvalidMetadata(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog store error
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Stripe(_) | PaymentError::Timeout(_) => true,
            PaymentError::Catalog(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Unauthorized => "Please sign in to continue.",
            PaymentError::BeatNotFound(_) => "Beat not found.",
            PaymentError::NoLicense(_) => "No license available for this beat.",
            PaymentError::InvalidPrice(_) => "This beat cannot be purchased right now.",
            PaymentError::Stripe(_) | PaymentError::Timeout(_) => {
                "Payment processing failed. Please try again."
            }
            PaymentError::WebhookSignature(_) => "Webhook signature verification failed.",
            PaymentError::WebhookParse(_) => "Invalid webhook payload.",
            PaymentError::InvalidMetadata(_) => "Invalid metadata.",
            PaymentError::Config(_) => "Service configuration error.",
            PaymentError::Catalog(_) => "An error occurred processing your request.",
        }
    }
}
