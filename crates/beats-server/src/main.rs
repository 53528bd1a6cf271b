//! Beat marketplace HTTP server
//!
//! Serves the catalog, checkout, Stripe webhook and media endpoints.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use beats_catalog::{CatalogStore, SqliteCatalogStore};
use beats_media::{BlobStore, S3Presigner};
use beats_payments::{StripeClient, WebhookVerifier};
use beats_server::{router, AppConfig, AppState, HeaderAuthenticator, Payments};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    // Catalog
    let catalog: Arc<dyn CatalogStore> =
        Arc::new(SqliteCatalogStore::connect(&config.database_url).await?);
    tracing::info!("✓ Catalog ready ({})", config.database_location());

    // Payments
    let payments = config.stripe.as_ref().map(|stripe| {
        let gateway = Arc::new(StripeClient::new(stripe));
        let verifier = WebhookVerifier::new(stripe.webhook_secret.clone(), stripe.webhook_tolerance);
        Payments::new(catalog.clone(), gateway, verifier, &config.base_url)
    });

    if payments.is_some() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - payments disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    // Media
    let blobs: Option<Arc<dyn BlobStore>> = match config.s3.clone() {
        Some(s3) => {
            let presigner = S3Presigner::new(s3)?;
            tracing::info!("✓ S3 configured (bucket {})", presigner.bucket());
            Some(Arc::new(presigner))
        }
        None => {
            tracing::warn!("⚠ S3 not configured - uploads and playback disabled");
            tracing::warn!("  Set AWS_REGION, AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and AWS_BUCKET_NAME in .env");
            None
        }
    };

    // Build application state
    let state = AppState {
        catalog,
        payments,
        blobs,
        auth: Arc::new(HeaderAuthenticator::new(&config.auth_header)?),
    };

    let app = router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 beats server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                        - Health check");
    tracing::info!("  GET  /api/beats                     - List published beats");
    tracing::info!("  POST /api/beats                     - Publish a beat");
    tracing::info!("  POST /api/beats/{{id}}/purchase       - Start checkout");
    tracing::info!("  POST /api/webhooks/stripe           - Stripe webhook");
    tracing::info!("  GET  /beats/{{id}}/success            - Purchase status");
    tracing::info!("  GET  /api/library                   - Purchased beats");
    tracing::info!("  POST /api/uploads/presign           - Presigned upload URL");
    tracing::info!("  GET  /api/beats/{{id}}/preview        - Preview URL");
    tracing::info!("  GET  /api/beats/{{id}}/download       - Download URL");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
