//! Payment Gateway
//!
//! Abstraction over the hosted-checkout provider. `StripeClient` talks to
//! Stripe; `MockPaymentGateway` keeps sessions in memory for tests.

mod mock;
mod stripe;

pub use self::mock::MockPaymentGateway;
pub use self::stripe::{StripeClient, StripeConfig};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{PaymentError, Result};

/// Metadata key carrying the beat id on a checkout session
pub const META_BEAT_ID: &str = "beatId";
/// Metadata key carrying the license id
pub const META_LICENSE_ID: &str = "licenseId";
/// Metadata key carrying the buyer id
pub const META_BUYER_ID: &str = "buyerId";
/// Older sessions carried the buyer under this key
pub const META_LEGACY_BUYER_ID: &str = "userId";

/// Payment gateway trait (Strategy pattern)
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session
    async fn create_checkout_session(&self, request: CheckoutRequest) -> Result<CheckoutSession>;

    /// Look up a checkout session; `Ok(None)` when the provider does not know the id
    async fn retrieve_session(&self, session_id: &str) -> Result<Option<SessionSnapshot>>;

    /// Gateway name
    fn name(&self) -> &str;
}

/// Request to create a checkout session for a single item
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Line-item name shown on the hosted page
    pub product_name: String,

    /// Line-item description
    pub description: String,

    /// Price in minor currency units (cents)
    pub unit_amount: i64,

    /// URL to redirect after successful payment
    pub success_url: String,

    /// URL to redirect if checkout is cancelled
    pub cancel_url: String,

    /// Opaque metadata echoed back on the completion webhook
    pub metadata: BTreeMap<String, String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Provider session ID
    pub id: String,

    /// URL to redirect the buyer to
    pub checkout_url: String,
}

/// What the provider currently knows about a checkout session
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,

    /// Payment-intent id, present once a payment exists
    pub payment_reference: Option<String>,

    /// Total charged in minor units
    pub amount_total: Option<i64>,

    /// Whether the provider reports the session as paid
    pub paid: bool,

    pub metadata: BTreeMap<String, String>,
}

impl SessionSnapshot {
    /// Buyer id recorded when the session was created, if any
    pub fn buyer_id(&self) -> Option<&str> {
        self.metadata
            .get(META_BUYER_ID)
            .or_else(|| self.metadata.get(META_LEGACY_BUYER_ID))
            .map(String::as_str)
    }

    /// Beat id recorded when the session was created, if any
    pub fn beat_id(&self) -> Option<&str> {
        self.metadata.get(META_BEAT_ID).map(String::as_str)
    }
}

/// Convert a decimal price to integer cents, rounding half away from zero
pub fn to_minor_units(price: Decimal) -> Result<i64> {
    let cents = (price * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidPrice(format!("{price} is out of range")))?;

    if cents <= 0 {
        return Err(PaymentError::InvalidPrice(format!("{price} is not a positive amount")));
    }
    Ok(cents)
}

/// Convert integer cents back to a decimal amount
pub fn from_minor_units(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
