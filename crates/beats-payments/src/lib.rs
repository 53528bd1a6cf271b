//! # beats-payments
//!
//! Beat checkout and purchase fulfillment over Stripe Checkout (Hosted).
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │ Beat page   │────▶│  Stripe Hosted  │────▶│  Success page    │
//! │ (purchase)  │     │  Checkout Page  │     │  (status poll)   │
//! └─────────────┘     └────────┬────────┘     └────────┬─────────┘
//!                              │ webhook               │ read-only
//!                              ▼                       ▼
//!                     ┌─────────────────┐     ┌──────────────────┐
//!                     │ WebhookReconciler│───▶│   CatalogStore   │
//!                     │ (single writer) │     │ purchases UNIQUE │
//!                     └─────────────────┘     └──────────────────┘
//! ```
//!
//! The buyer's redirect and the webhook race. The success page therefore
//! treats "no purchase yet" as `Pending`, and the webhook may be delivered
//! any number of times: the payment-intent id is the idempotency key.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use beats_payments::{CheckoutService, StripeClient, StripeConfig};
//!
//! let config = StripeConfig::new("sk_test_xxx", "whsec_xxx");
//! let gateway = Arc::new(StripeClient::new(&config));
//! let checkout = CheckoutService::new(catalog, gateway, "https://beats.example");
//!
//! let redirect = checkout.initiate(Some(buyer), beat_id).await?;
//! // Redirect the buyer to: redirect.url
//! ```

mod checkout;
mod error;
mod gateway;
mod status;
mod webhook;

pub use checkout::{CheckoutRedirect, CheckoutService};
pub use error::{PaymentError, Result};
pub use gateway::{
    from_minor_units, to_minor_units, CheckoutRequest, CheckoutSession, MockPaymentGateway,
    PaymentGateway, SessionSnapshot, StripeClient, StripeConfig, META_BEAT_ID, META_BUYER_ID,
    META_LEGACY_BUYER_ID, META_LICENSE_ID,
};
pub use status::{CheckoutStatus, PurchaseStatusResolver};
pub use webhook::{
    signature_header, CompletedCheckout, PurchaseMetadata, WebhookEvent, WebhookOutcome,
    WebhookReconciler, WebhookVerifier, SIGNATURE_HEADER,
};
