//! Purchase Status
//!
//! What the buyer sees after being redirected back from checkout. The
//! webhook may not have arrived yet, so "no purchase row" is a normal,
//! temporary state rather than an error.

use beats_catalog::{BeatId, CatalogStore, Purchase, UserId};
use serde::Serialize;
use std::sync::Arc;

use crate::gateway::PaymentGateway;

/// Outcome shown on the success page
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutStatus {
    /// No session id in the request
    Invalid,

    /// No signed-in buyer
    Unauthenticated,

    /// The session cannot be confirmed for this buyer
    Unverifiable,

    /// Paid or paying, but not recorded yet; poll again
    Pending,

    /// Purchase recorded
    Completed { purchase: Purchase },
}

impl CheckoutStatus {
    pub fn message(&self) -> &'static str {
        match self {
            CheckoutStatus::Invalid => "Invalid checkout session. Please try your purchase again.",
            CheckoutStatus::Unauthenticated => "Please sign in to view your purchase.",
            CheckoutStatus::Unverifiable => {
                "We could not verify this purchase. Please contact support."
            }
            CheckoutStatus::Pending => {
                "Your payment is being processed. This page will update shortly."
            }
            CheckoutStatus::Completed { .. } => "Purchase complete! The beat is in your library.",
        }
    }

    /// Whether polling again could change the answer
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckoutStatus::Pending)
    }
}

/// Resolves a checkout session id into a `CheckoutStatus`. Never writes.
pub struct PurchaseStatusResolver {
    catalog: Arc<dyn CatalogStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl PurchaseStatusResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { catalog, gateway }
    }

    /// Status of `session_id` as shown on the success page of `beat_id`
    pub async fn resolve(
        &self,
        session_id: Option<&str>,
        beat_id: BeatId,
        buyer: Option<UserId>,
    ) -> CheckoutStatus {
        let Some(session_id) = session_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return CheckoutStatus::Invalid;
        };
        let Some(buyer) = buyer else {
            return CheckoutStatus::Unauthenticated;
        };

        let snapshot = match self.gateway.retrieve_session(session_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::warn!(session_id = %session_id, "Checkout session not found");
                return CheckoutStatus::Unverifiable;
            }
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Checkout session lookup failed");
                return CheckoutStatus::Unverifiable;
            }
        };

        if let Some(owner) = snapshot.buyer_id() {
            if owner.trim().parse::<i64>().ok() != Some(buyer.get()) {
                tracing::warn!(
                    session_id = %session_id,
                    buyer = %buyer,
                    session_buyer = %owner,
                    "Checkout session belongs to another buyer"
                );
                return CheckoutStatus::Unverifiable;
            }
        }

        let session_beat = snapshot.beat_id();
        if session_beat.and_then(|b| b.trim().parse::<i64>().ok()) != Some(beat_id.get()) {
            tracing::warn!(
                session_id = %session_id,
                beat_id = %beat_id,
                session_beat = ?session_beat,
                "Checkout session is for another beat"
            );
            return CheckoutStatus::Unverifiable;
        }

        let Some(reference) = snapshot.payment_reference.as_deref() else {
            tracing::debug!(session_id = %session_id, paid = snapshot.paid, "No payment yet");
            return CheckoutStatus::Pending;
        };

        match self
            .catalog
            .find_purchase_by_payment_reference(reference, Some(buyer))
            .await
        {
            Ok(Some(purchase)) => CheckoutStatus::Completed { purchase },
            Ok(None) => {
                tracing::debug!(payment_reference = %reference, "Purchase not recorded yet");
                CheckoutStatus::Pending
            }
            Err(e) => {
                tracing::error!(payment_reference = %reference, error = %e, "Purchase lookup failed");
                CheckoutStatus::Pending
            }
        }
    }
}
