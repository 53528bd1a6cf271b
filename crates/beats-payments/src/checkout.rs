//! Checkout Initiation
//!
//! Turns a (beat, buyer) pair into a hosted-checkout redirect. Nothing is
//! written locally here; the purchase is recorded when the webhook arrives.

use beats_catalog::{BeatId, CatalogStore, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PaymentError, Result};
use crate::gateway::{
    to_minor_units, CheckoutRequest, PaymentGateway, META_BEAT_ID, META_BUYER_ID, META_LICENSE_ID,
};

/// Placeholder Stripe substitutes with the real session id on redirect
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Where the buyer should be sent next
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    pub url: String,
    pub session_id: String,
}

/// Checkout initiation service
pub struct CheckoutService {
    catalog: Arc<dyn CatalogStore>,
    gateway: Arc<dyn PaymentGateway>,
    base_url: String,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        gateway: Arc<dyn PaymentGateway>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            gateway,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Start a checkout for the beat's basic license
    pub async fn initiate(&self, buyer: Option<UserId>, beat_id: BeatId) -> Result<CheckoutRedirect> {
        let buyer = buyer.ok_or(PaymentError::Unauthorized)?;

        let beat = self
            .catalog
            .get_beat_with_licenses(beat_id)
            .await?
            .filter(|b| b.beat.is_published)
            .ok_or(PaymentError::BeatNotFound(beat_id))?;

        let license = beat.basic_license().ok_or(PaymentError::NoLicense(beat_id))?;
        let unit_amount = to_minor_units(license.price)?;

        let mut metadata = BTreeMap::new();
        metadata.insert(META_BEAT_ID.to_string(), beat_id.to_string());
        metadata.insert(META_LICENSE_ID.to_string(), license.id.to_string());
        metadata.insert(META_BUYER_ID.to_string(), buyer.to_string());

        let request = CheckoutRequest {
            product_name: beat.beat.title.clone(),
            description: format!("License: {}", license.name),
            unit_amount,
            success_url: format!(
                "{}/beats/{beat_id}/success?session_id={SESSION_ID_PLACEHOLDER}",
                self.base_url
            ),
            cancel_url: format!("{}/beats/{beat_id}", self.base_url),
            metadata,
        };

        let session = self.gateway.create_checkout_session(request).await?;

        tracing::info!(
            beat_id = %beat_id,
            license_id = %license.id,
            buyer = %buyer,
            session_id = %session.id,
            gateway = self.gateway.name(),
            "Created checkout session"
        );

        Ok(CheckoutRedirect {
            url: session.checkout_url,
            session_id: session.id,
        })
    }
}
