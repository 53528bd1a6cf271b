//! Application State

use std::sync::Arc;

use beats_catalog::CatalogStore;
use beats_media::BlobStore;
use beats_payments::{
    CheckoutService, PaymentGateway, PurchaseStatusResolver, WebhookReconciler, WebhookVerifier,
};

use crate::auth::BuyerAuthenticator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Beats, licenses and purchases
    pub catalog: Arc<dyn CatalogStore>,

    /// Checkout and fulfillment (optional - None if Stripe is not configured)
    pub payments: Option<Payments>,

    /// Object storage (optional - None if S3 is not configured)
    pub blobs: Option<Arc<dyn BlobStore>>,

    pub auth: Arc<dyn BuyerAuthenticator>,
}

/// The three payment services, all sharing one gateway and catalog
#[derive(Clone)]
pub struct Payments {
    pub checkout: Arc<CheckoutService>,
    pub webhooks: Arc<WebhookReconciler>,
    pub status: Arc<PurchaseStatusResolver>,
}

impl Payments {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        base_url: &str,
    ) -> Self {
        Self {
            checkout: Arc::new(CheckoutService::new(catalog.clone(), gateway.clone(), base_url)),
            webhooks: Arc::new(WebhookReconciler::new(verifier, catalog.clone())),
            status: Arc::new(PurchaseStatusResolver::new(catalog, gateway)),
        }
    }
}
