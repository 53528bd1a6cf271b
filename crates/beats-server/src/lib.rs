//! Beat marketplace HTTP server
//!
//! Axum router over the catalog, payment and media crates. `main.rs` wires
//! the real Stripe/SQLite/S3 implementations; tests build the same router
//! over in-memory doubles.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    checkout_success, create_beat, download_beat, health_check, library, list_beats,
    presign_upload, preview_beat, purchase_beat, stripe_webhook,
};

pub use auth::{BuyerAuthenticator, CurrentBuyer, HeaderAuthenticator};
pub use config::{AppConfig, ConfigError};
pub use state::{AppState, Payments};

/// Build the application router
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Catalog
        .route("/api/beats", get(list_beats).post(create_beat))
        .route("/api/library", get(library))

        // Payments
        .route("/api/beats/{beat_id}/purchase", get(purchase_beat).post(purchase_beat))
        .route("/api/webhooks/stripe", post(stripe_webhook))
        .route("/beats/{beat_id}/success", get(checkout_success))

        // Media
        .route("/api/uploads/presign", post(presign_upload))
        .route("/api/beats/{beat_id}/preview", get(preview_beat))
        .route("/api/beats/{beat_id}/download", get(download_beat))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
