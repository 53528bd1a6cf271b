//! Stripe Checkout Integration
//!
//! Implements the "Stripe Checkout (Hosted)" approach: one-off payments for a
//! single beat license, with the beat/license/buyer ids carried as metadata.

use async_trait::async_trait;
use std::time::Duration;
use ::stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionId, CheckoutSessionMode,
    CheckoutSessionPaymentStatus, Client, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentMethodTypes, Currency, RequestStrategy, StripeError,
};

use super::{CheckoutRequest, CheckoutSession, PaymentGateway, SessionSnapshot};
use crate::error::{PaymentError, Result};

/// Stripe credentials and call policy
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: String,

    /// Webhook signing secret (`whsec_...`)
    pub webhook_secret: String,

    /// Deadline for a single gateway call, retries included
    pub timeout: Duration,

    /// Retries for idempotent lookups
    pub max_retries: u32,

    /// Maximum accepted age of a webhook signature timestamp
    pub webhook_tolerance: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
            webhook_tolerance: Duration::from_secs(300),
        }
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .finish()
    }
}

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
            timeout: config.timeout,
            max_retries: config.max_retries,
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = std::result::Result<T, StripeError>>,
    ) -> Result<std::result::Result<T, StripeError>> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PaymentError::Timeout(self.timeout))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    /// Create a Stripe Checkout session (Hosted approach)
    ///
    /// Sent once: a retried create could open a second session for the buyer.
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession> {
        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(request.metadata.clone().into_iter().collect());

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: Currency::USD,
                unit_amount: Some(request.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.product_name.clone(),
                    description: Some(request.description.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let client = self.client.clone().with_strategy(RequestStrategy::Once);
        let session = self
            .bounded(StripeCheckoutSession::create(&client, params))
            .await?
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<Option<SessionSnapshot>> {
        let Ok(id) = session_id.parse::<CheckoutSessionId>() else {
            tracing::debug!(session_id = %session_id, "Not a checkout session id");
            return Ok(None);
        };

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::ExponentialBackoff(self.max_retries));

        let session = match self
            .bounded(StripeCheckoutSession::retrieve(&client, &id, &[]))
            .await?
        {
            Ok(session) => session,
            Err(StripeError::Stripe(err)) if err.http_status == 404 => return Ok(None),
            Err(e) => return Err(PaymentError::Stripe(e.to_string())),
        };

        Ok(Some(SessionSnapshot {
            id: session.id.to_string(),
            payment_reference: session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
            amount_total: session.amount_total,
            paid: matches!(session.payment_status, CheckoutSessionPaymentStatus::Paid),
            metadata: session.metadata.unwrap_or_default().into_iter().collect(),
        }))
    }

    fn name(&self) -> &str {
        "stripe"
    }
}
